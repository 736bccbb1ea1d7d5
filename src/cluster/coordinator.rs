//! Request routing, quorum collection, and last-writer-wins response
//! merging across a fixed-topology replica set.

use crate::cluster::client_pool::ClientPool;
use crate::cluster::rendezvous;
use crate::cluster::topology::Topology;
use crate::core::engine::LsmEngine;
use crate::infra::error::DispatchError;

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// A coordinator-level request, independent of the HTTP transport.
#[derive(Clone)]
pub enum CoordRequest {
    Get { key: Vec<u8> },
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl CoordRequest {
    fn key(&self) -> &[u8] {
        match self {
            CoordRequest::Get { key } | CoordRequest::Delete { key } => key,
            CoordRequest::Put { key, .. } => key,
        }
    }
}

/// What a single replica returned for a subrequest, normalized whether it
/// came from the local engine or a proxied HTTP call.
struct SubResponse {
    status: u16,
    body: Vec<u8>,
    tombstone: bool,
}

fn is_confirm(status: u16) -> bool {
    matches!(status, 200 | 201 | 202 | 404)
}

/// Handle a request already marked `Proxy: true` by a peer coordinator:
/// hit the engine directly and hand back the raw record-with-timestamp
/// form, bypassing ranking and quorum entirely. Returns
/// `(status, body, is_tombstone)`.
pub fn handle_proxied(engine: &LsmEngine, request: &CoordRequest) -> (u16, Vec<u8>, bool) {
    let response = call_local(engine, request);
    (response.status, response.body, response.tombstone)
}

pub struct ReplicationCoordinator {
    topology: Topology,
    engine: Arc<LsmEngine>,
    client_pool: ClientPool,
    worker_permits: Arc<Semaphore>,
    read_repair_permits: Arc<Semaphore>,
}

impl ReplicationCoordinator {
    pub fn new(
        topology: Topology,
        engine: Arc<LsmEngine>,
        client_pool: ClientPool,
        worker_pool_size: usize,
        read_repair_pool_size: usize,
    ) -> Self {
        Self {
            topology,
            engine,
            client_pool,
            worker_permits: Arc::new(Semaphore::new(worker_pool_size)),
            read_repair_permits: Arc::new(Semaphore::new(read_repair_pool_size)),
        }
    }

    /// Run the full coordinator algorithm for `request`, bounded to at most
    /// `worker_pool_size` concurrent dispatches. Returns the merged
    /// `(status, body)` pair ready to send to the client, or a
    /// `DispatchError` (quorum unreachable maps to 504).
    pub async fn dispatch(
        &self,
        request: CoordRequest,
        ack: usize,
        from: usize,
    ) -> Result<(u16, Vec<u8>), DispatchError> {
        let _permit = self
            .worker_permits
            .acquire()
            .await
            .expect("worker semaphore is never closed");

        let ranked = rendezvous::rank(&self.topology, request.key());
        let replicas = &ranked[..from.min(ranked.len())];

        let mut confirmed: Vec<SubResponse> = Vec::with_capacity(ack);
        for (attempted, &node_idx) in replicas.iter().enumerate() {
            let response = self.call_replica(node_idx, &request).await;
            let confirm = is_confirm(response.status);
            if confirm {
                confirmed.push(response);
            }
            if confirmed.len() >= ack {
                let untried: Vec<usize> = replicas[attempted + 1..].to_vec();
                self.spawn_read_repair(untried, request.clone());
                return Ok(merge_response(&request, &confirmed));
            }
        }

        warn!(
            ack,
            from,
            confirmed = confirmed.len(),
            "quorum unreachable"
        );
        Err(DispatchError::QuorumUnreachable)
    }

    async fn call_replica(&self, node_idx: usize, request: &CoordRequest) -> SubResponse {
        call_replica(&self.topology, &self.engine, &self.client_pool, node_idx, request).await
    }

    /// Fire-and-forget queries against replicas that quorum never reached,
    /// pulling them forward via the engine's normal upsert path. Bounded by
    /// a separate, smaller semaphore so a flood of repairs cannot starve
    /// the main request pool.
    fn spawn_read_repair(&self, untried: Vec<usize>, request: CoordRequest) {
        if untried.is_empty() {
            return;
        }
        let topology = self.topology.clone();
        let engine = Arc::clone(&self.engine);
        let client_pool = self.client_pool.clone();
        let permits = Arc::clone(&self.read_repair_permits);

        tokio::spawn(async move {
            for node_idx in untried {
                let Ok(_permit) = permits.clone().acquire_owned().await else {
                    return;
                };
                let _ = call_replica(&topology, &engine, &client_pool, node_idx, &request).await;
            }
        });
    }
}

async fn call_replica(
    topology: &Topology,
    engine: &LsmEngine,
    client_pool: &ClientPool,
    node_idx: usize,
    request: &CoordRequest,
) -> SubResponse {
    if node_idx == topology.self_index() {
        call_local(engine, request)
    } else {
        call_remote(topology, client_pool, node_idx, request).await
    }
}

fn call_local(engine: &LsmEngine, request: &CoordRequest) -> SubResponse {
    match request {
        CoordRequest::Get { key } => match engine.get(key) {
            Ok(Some(record)) if record.is_tombstone() => SubResponse {
                status: 200,
                body: record.timestamp.to_be_bytes().to_vec(),
                tombstone: true,
            },
            Ok(Some(record)) => {
                let mut body = record.value.unwrap_or_default();
                body.extend_from_slice(&record.timestamp.to_be_bytes());
                SubResponse { status: 200, body, tombstone: false }
            }
            Ok(None) => SubResponse { status: 404, body: Vec::new(), tombstone: false },
            Err(e) => {
                warn!(error = %e, "local get failed");
                SubResponse { status: 503, body: Vec::new(), tombstone: false }
            }
        },
        CoordRequest::Put { key, value } => match engine.put(key.clone(), value.clone()) {
            Ok(_) => SubResponse { status: 201, body: Vec::new(), tombstone: false },
            Err(e) => {
                warn!(error = %e, "local put failed");
                SubResponse { status: 503, body: Vec::new(), tombstone: false }
            }
        },
        CoordRequest::Delete { key } => match engine.delete(key.clone()) {
            Ok(_) => SubResponse { status: 202, body: Vec::new(), tombstone: false },
            Err(e) => {
                warn!(error = %e, "local delete failed");
                SubResponse { status: 503, body: Vec::new(), tombstone: false }
            }
        },
    }
}

async fn call_remote(
    topology: &Topology,
    client_pool: &ClientPool,
    node_idx: usize,
    request: &CoordRequest,
) -> SubResponse {
    let endpoint = topology.endpoint(node_idx);
    let url = entity_url(endpoint, request.key());

    let result = match request {
        CoordRequest::Get { .. } => client_pool.proxy_get(&url).await,
        CoordRequest::Put { value, .. } => client_pool.proxy_put(&url, value.clone()).await,
        CoordRequest::Delete { .. } => client_pool.proxy_delete(&url).await,
    };

    match result {
        Ok(response) => {
            let status = response.status().as_u16();
            let tombstone = response.headers().contains_key("Tombstone");
            let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            SubResponse { status, body, tombstone }
        }
        Err(e) => {
            debug!(node = endpoint, error = %e, "subrequest transport failure");
            SubResponse { status: 503, body: Vec::new(), tombstone: false }
        }
    }
}

/// Merge confirmed subresponses per the method's semantics. `confirmed` is
/// guaranteed non-empty (the caller only calls this once `ack` confirms
/// accumulated).
fn merge_response(request: &CoordRequest, confirmed: &[SubResponse]) -> (u16, Vec<u8>) {
    match request {
        CoordRequest::Put { .. } => (201, Vec::new()),
        CoordRequest::Delete { .. } => (202, Vec::new()),
        CoordRequest::Get { .. } => {
            let winner = confirmed
                .iter()
                .map(|r| (response_timestamp(r), r))
                .max_by_key(|(ts, _)| *ts)
                .expect("confirmed is non-empty");

            let (timestamp, response) = winner;
            if timestamp < 0 || response.tombstone {
                return (404, Vec::new());
            }
            let value_len = response.body.len().saturating_sub(8);
            (200, response.body[..value_len].to_vec())
        }
    }
}

/// A 404 counts as a "no data" vote with timestamp -1; otherwise the
/// timestamp is the trailing 8 bytes of the body.
fn response_timestamp(response: &SubResponse) -> i64 {
    if response.status == 404 {
        return -1;
    }
    if response.body.len() < 8 {
        return -1;
    }
    let split = response.body.len() - 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&response.body[split..]);
    i64::from_be_bytes(buf)
}

fn entity_url(endpoint: &str, key: &[u8]) -> String {
    format!("http://{endpoint}/v0/entity?id={}", percent_encode(key))
}

/// Minimal percent-encoding sufficient for the `id` query parameter: keys
/// are expected to be UTF-8 strings, but arbitrary bytes are still encoded
/// safely byte-by-byte rather than assumed valid.
fn percent_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
