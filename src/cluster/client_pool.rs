//! Thin wrapper around a single shared `reqwest::Client`.
//!
//! `reqwest::Client` already keeps a keep-alive connection pool per host
//! internally, so "one client per node" is the pool — there is no separate
//! per-replica handle to create or recycle. What this type adds is the
//! fixed per-subrequest timeout and a uniform translation of any transport
//! failure (timeout, connection refused, DNS) into a local 503, so the
//! coordinator only ever has to reason about HTTP status codes.

use crate::infra::error::DispatchError;
use std::time::Duration;

#[derive(Clone)]
pub struct ClientPool {
    client: reqwest::Client,
}

impl ClientPool {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder with a fixed timeout cannot fail");
        Self { client }
    }

    /// Issue a GET against `url`, carrying the internal `Proxy: true`
    /// marker header so the receiving node answers with the raw
    /// record-with-timestamp form instead of running its own coordinator.
    pub async fn proxy_get(&self, url: &str) -> Result<reqwest::Response, DispatchError> {
        self.client
            .get(url)
            .header("Proxy", "true")
            .send()
            .await
            .map_err(transport_error)
    }

    pub async fn proxy_put(&self, url: &str, body: Vec<u8>) -> Result<reqwest::Response, DispatchError> {
        self.client
            .put(url)
            .header("Proxy", "true")
            .body(body)
            .send()
            .await
            .map_err(transport_error)
    }

    pub async fn proxy_delete(&self, url: &str) -> Result<reqwest::Response, DispatchError> {
        self.client
            .delete(url)
            .header("Proxy", "true")
            .send()
            .await
            .map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Unavailable(format!("replica timed out: {err}"))
    } else {
        DispatchError::Unavailable(format!("replica unreachable: {err}"))
    }
}
