//! Replica identity for the replication topology.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Unique identifier for one autonomous directory instance.
pub type ReplicaId = u64;

/// Identity of a replication peer: a stable id plus the statically
/// configured network address used to validate inbound identity claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Unique replica identifier.
    pub id: ReplicaId,
    /// Configured network address of the peer.
    pub address: SocketAddr,
}

impl Replica {
    /// Create a new replica identity.
    pub fn new(id: ReplicaId, address: SocketAddr) -> Self {
        Self { id, address }
    }
}
