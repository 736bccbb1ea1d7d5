use crate::infra::error::{LsmError, Result};
use std::env;
use std::time::Duration;

/// Node-facing configuration: how this process is reached, who its peers
/// are, and the defaults that shape every request's quorum and concurrency.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// This node's own `host:port`, as it appears in `topology`.
    pub self_endpoint: String,
    /// Every node in the cluster, self included, in a fixed, agreed-upon order.
    pub topology: Vec<String>,
    pub worker_pool_size: usize,
    pub read_repair_pool_size: usize,
    pub replica_timeout: Duration,
    pub default_ack: usize,
    pub default_from: usize,
}

const DEFAULT_WORKER_POOL_SIZE: usize = 8;
const DEFAULT_READ_REPAIR_POOL_SIZE: usize = 2;
const DEFAULT_REPLICA_TIMEOUT_MS: u64 = 100;

impl Default for ServerConfig {
    fn default() -> Self {
        let topology = vec!["127.0.0.1:8080".to_string()];
        let default_from = topology.len();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            self_endpoint: topology[0].clone(),
            topology,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            read_repair_pool_size: DEFAULT_READ_REPAIR_POOL_SIZE,
            replica_timeout: Duration::from_millis(DEFAULT_REPLICA_TIMEOUT_MS),
            default_ack: default_from / 2 + 1,
            default_from,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(LsmError::InvalidPoolSize("worker pool cannot be 0".to_string()));
        }
        if self.read_repair_pool_size == 0 {
            return Err(LsmError::InvalidPoolSize(
                "read-repair pool cannot be 0".to_string(),
            ));
        }
        if self.replica_timeout.is_zero() {
            return Err(LsmError::InvalidTimeout("replica timeout cannot be 0".to_string()));
        }
        if self.topology.is_empty() {
            return Err(LsmError::InvalidPoolSize("topology cannot be empty".to_string()));
        }
        if !self.topology.contains(&self.self_endpoint) {
            return Err(LsmError::InvalidPoolSize(format!(
                "self endpoint {} is not a member of topology",
                self.self_endpoint
            )));
        }
        if self.default_from == 0 || self.default_from > self.topology.len() {
            return Err(LsmError::InvalidPoolSize(format!(
                "default `from` ({}) must be between 1 and topology size ({})",
                self.default_from,
                self.topology.len()
            )));
        }
        if self.default_ack == 0 || self.default_ack > self.default_from {
            return Err(LsmError::InvalidPoolSize(format!(
                "default `ack` ({}) must be between 1 and `from` ({})",
                self.default_ack, self.default_from
            )));
        }
        Ok(())
    }

    /// Read configuration from the environment, falling back to sensible
    /// single-node defaults for anything unset.
    ///
    /// `TOPOLOGY` is a comma-separated list of `host:port` endpoints.
    /// `ACK`/`FROM` default to `from = |topology|`, `ack = from / 2 + 1`.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let topology: Vec<String> = env::var("TOPOLOGY")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .filter(|v: &Vec<String>| !v.is_empty())
            .unwrap_or_else(|| vec![format!("{host}:{port}")]);

        let self_endpoint =
            env::var("SELF_ENDPOINT").unwrap_or_else(|_| format!("{host}:{port}"));

        let worker_pool_size = env::var("WORKER_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_WORKER_POOL_SIZE);

        let read_repair_pool_size = env::var("READ_REPAIR_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_READ_REPAIR_POOL_SIZE);

        let replica_timeout = Duration::from_millis(
            env::var("REPLICA_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REPLICA_TIMEOUT_MS),
        );

        let default_from = env::var("FROM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(topology.len());
        let default_ack = env::var("ACK")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_from / 2 + 1);

        Self {
            host,
            port,
            self_endpoint,
            topology,
            worker_pool_size,
            read_repair_pool_size,
            replica_timeout,
            default_ack,
            default_from,
        }
    }
}

#[derive(Default)]
pub struct ServerConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    self_endpoint: Option<String>,
    topology: Option<Vec<String>>,
    worker_pool_size: Option<usize>,
    read_repair_pool_size: Option<usize>,
    replica_timeout: Option<Duration>,
    default_ack: Option<usize>,
    default_from: Option<usize>,
}

impl ServerConfigBuilder {
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn self_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.self_endpoint = Some(endpoint.into());
        self
    }

    pub fn topology(mut self, topology: Vec<String>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = Some(size);
        self
    }

    pub fn read_repair_pool_size(mut self, size: usize) -> Self {
        self.read_repair_pool_size = Some(size);
        self
    }

    pub fn replica_timeout(mut self, timeout: Duration) -> Self {
        self.replica_timeout = Some(timeout);
        self
    }

    pub fn default_ack(mut self, ack: usize) -> Self {
        self.default_ack = Some(ack);
        self
    }

    pub fn default_from(mut self, from: usize) -> Self {
        self.default_from = Some(from);
        self
    }

    pub fn build(self) -> Result<ServerConfig> {
        let defaults = ServerConfig::default();
        let topology = self.topology.unwrap_or(defaults.topology);
        let default_from = self.default_from.unwrap_or(topology.len());
        let config = ServerConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            self_endpoint: self.self_endpoint.unwrap_or(defaults.self_endpoint),
            topology,
            worker_pool_size: self.worker_pool_size.unwrap_or(defaults.worker_pool_size),
            read_repair_pool_size: self
                .read_repair_pool_size
                .unwrap_or(defaults.read_repair_pool_size),
            replica_timeout: self.replica_timeout.unwrap_or(defaults.replica_timeout),
            default_ack: self.default_ack.unwrap_or(default_from / 2 + 1),
            default_from,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn ack_greater_than_from_is_rejected() {
        let result = ServerConfig::builder()
            .topology(vec!["a:1".into(), "b:1".into()])
            .self_endpoint("a:1")
            .default_from(2)
            .default_ack(3)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn self_endpoint_must_be_in_topology() {
        let result = ServerConfig::builder()
            .topology(vec!["a:1".into()])
            .self_endpoint("b:1")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn three_node_defaults_give_majority_ack() {
        let config = ServerConfig::builder()
            .topology(vec!["a:1".into(), "b:1".into(), "c:1".into()])
            .self_endpoint("a:1")
            .build()
            .unwrap();
        assert_eq!(config.default_from, 3);
        assert_eq!(config.default_ack, 2);
    }
}
