//! Error types for the replication engine.

use oxidir_model::ReplicaId;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur in the replication engine.
#[derive(Debug, Error)]
pub enum ReplError {
    /// A peer claimed a replica id that is not in the configured peer list.
    #[error("unknown replica: {replica_id}")]
    UnknownReplica {
        /// The claimed replica identifier.
        replica_id: ReplicaId,
    },

    /// A peer's connection address does not match its configured address.
    #[error("address mismatch for replica {replica_id}: expected {expected}, got {actual}")]
    AddressMismatch {
        /// The claimed replica identifier.
        replica_id: ReplicaId,
        /// The statically configured address.
        expected: SocketAddr,
        /// The address the connection actually came from.
        actual: SocketAddr,
    },

    /// A message was not valid for the current protocol state.
    #[error("protocol violation: {msg}")]
    Protocol {
        /// Description of the violation.
        msg: String,
    },

    /// Executing an operation against the local partition failed.
    #[error("apply failed for {dn}: {msg}")]
    Apply {
        /// Target distinguished name of the failed operation.
        dn: String,
        /// Description of the failure.
        msg: String,
    },

    /// The peer did not complete login within the configured timeout.
    #[error("login timed out")]
    LoginTimeout,

    /// A pending request went unanswered past the configured timeout.
    #[error("response timed out for sequence {sequence}")]
    ResponseTimeout {
        /// Sequence number of the unanswered request.
        sequence: u64,
    },

    /// The underlying session was closed.
    #[error("session closed")]
    SessionClosed,

    /// Serialization/deserialization error.
    #[error("serialization error")]
    Serialization(#[from] bincode::Error),

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("config error: {msg}")]
    Config {
        /// Description of the problem.
        msg: String,
    },
}
