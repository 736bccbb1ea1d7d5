pub mod client_pool;
pub mod coordinator;
pub mod rendezvous;
pub mod topology;

pub use client_pool::ClientPool;
pub use coordinator::{CoordRequest, ReplicationCoordinator};
pub use topology::Topology;
