//! Wire messages of the replication protocol.
//!
//! Four request/response pairs: `Login`, `BeginLogEntries`, `LogEntry`,
//! `EndLogEntries`. Every message carries the sender's per-connection
//! sequence number; acknowledgements echo the sequence of the request they
//! answer. Encoding is bincode; transport framing is the session layer's
//! concern.

use crate::error::ReplError;
use crate::op::Operation;
use oxidir_model::{CsnVector, ReplicaId};
use serde::{Deserialize, Serialize};

/// Outcome code carried by every acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    /// The request was accepted.
    Ok,
    /// The request was rejected.
    NotOk,
}

/// A replication protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// Initiator identifies itself.
    Login {
        /// Sender's message sequence number.
        sequence: u64,
        /// The initiator's replica id.
        replica_id: ReplicaId,
    },
    /// Responder's answer to `Login`, carrying its own replica id.
    LoginAck {
        /// Sequence of the `Login` being answered.
        sequence: u64,
        /// Accept/reject.
        response_code: ResponseCode,
        /// The responder's replica id.
        replica_id: ReplicaId,
    },
    /// Initiator asks to start a replication round.
    BeginLogEntries {
        /// Sender's message sequence number.
        sequence: u64,
    },
    /// Responder grants or refuses a round. On grant it advertises its
    /// purge and update vectors; on refusal both are absent.
    BeginLogEntriesAck {
        /// Sequence of the `BeginLogEntries` being answered.
        sequence: u64,
        /// Accept/reject (reject when another peer's round is active).
        response_code: ResponseCode,
        /// Responder's purge vector, present on `Ok`.
        purge_vector: Option<CsnVector>,
        /// Responder's update vector, present on `Ok`.
        update_vector: Option<CsnVector>,
    },
    /// One logged operation shipped during a round.
    LogEntry {
        /// Sender's message sequence number.
        sequence: u64,
        /// The operation to apply and record.
        operation: Operation,
    },
    /// Responder's per-entry acknowledgement.
    LogEntryAck {
        /// Sequence of the `LogEntry` being answered.
        sequence: u64,
        /// Accept/reject (reject is fatal to the round).
        response_code: ResponseCode,
    },
    /// Initiator ends the round, releasing the responder's write lock.
    EndLogEntries {
        /// Sender's message sequence number.
        sequence: u64,
    },
    /// Responder's acknowledgement of the round ending.
    EndLogEntriesAck {
        /// Sequence of the `EndLogEntries` being answered.
        sequence: u64,
        /// `Ok` iff the sender actually held the lock.
        response_code: ResponseCode,
    },
}

impl ReplicationMessage {
    /// The sequence number carried by this message.
    pub fn sequence(&self) -> u64 {
        match self {
            ReplicationMessage::Login { sequence, .. }
            | ReplicationMessage::LoginAck { sequence, .. }
            | ReplicationMessage::BeginLogEntries { sequence }
            | ReplicationMessage::BeginLogEntriesAck { sequence, .. }
            | ReplicationMessage::LogEntry { sequence, .. }
            | ReplicationMessage::LogEntryAck { sequence, .. }
            | ReplicationMessage::EndLogEntries { sequence }
            | ReplicationMessage::EndLogEntriesAck { sequence, .. } => *sequence,
        }
    }

    /// Short static name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplicationMessage::Login { .. } => "Login",
            ReplicationMessage::LoginAck { .. } => "LoginAck",
            ReplicationMessage::BeginLogEntries { .. } => "BeginLogEntries",
            ReplicationMessage::BeginLogEntriesAck { .. } => "BeginLogEntriesAck",
            ReplicationMessage::LogEntry { .. } => "LogEntry",
            ReplicationMessage::LogEntryAck { .. } => "LogEntryAck",
            ReplicationMessage::EndLogEntries { .. } => "EndLogEntries",
            ReplicationMessage::EndLogEntriesAck { .. } => "EndLogEntriesAck",
        }
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> Result<Vec<u8>, ReplError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, ReplError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
