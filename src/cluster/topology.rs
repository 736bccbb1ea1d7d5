/// The fixed set of cluster members, in the order every node must agree on.
///
/// Rendezvous ranking depends on nodes iterating the same indices in the
/// same order, so the list is fixed at construction and never mutated —
/// runtime membership changes are out of scope.
#[derive(Debug, Clone)]
pub struct Topology {
    endpoints: Vec<String>,
    self_index: usize,
}

impl Topology {
    /// Sorts `endpoints` lexicographically before assigning indices, so every
    /// node that is handed the same membership list — regardless of the
    /// order it arrived from configuration — agrees on the same node ids and
    /// therefore the same rendezvous ranking.
    pub fn new(mut endpoints: Vec<String>, self_endpoint: &str) -> Option<Self> {
        endpoints.sort();
        let self_index = endpoints.iter().position(|e| e == self_endpoint)?;
        Some(Self {
            endpoints,
            self_index,
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn self_index(&self) -> usize {
        self.self_index
    }

    pub fn endpoint(&self, index: usize) -> &str {
        &self.endpoints[index]
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}
