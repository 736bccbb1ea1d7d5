//! Rendezvous (highest-random-weight) hashing: every node independently
//! computes the same ranking for a given key without exchanging state,
//! because the score is a pure function of `(endpoint, key)`.

use crate::cluster::topology::Topology;

/// 32-bit score for `(endpoint, key)`. CRC-32 over the concatenation of the
/// endpoint string and the raw key bytes — stable and cheap; the exact
/// algorithm only needs to agree across this cluster's own nodes, not with
/// any external reference implementation.
pub fn hash_score(endpoint: &str, key: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(key);
    hasher.finalize()
}

/// Rank every node in `topology` by ascending score for `key`, returning the
/// permutation of node indices (closest replica first). Ties break toward
/// the lower index, keeping the ranking a strict, deterministic function of
/// `(topology, key)`.
pub fn rank(topology: &Topology, key: &[u8]) -> Vec<usize> {
    let mut scored: Vec<(u32, usize)> = (0..topology.len())
        .map(|i| (hash_score(topology.endpoint(i), key), i))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, i)| i).collect()
}
