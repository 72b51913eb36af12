//! Per-connection replication state.
//!
//! One context exists per connection, created on open and destroyed on
//! close, and is never shared between connections. It tracks the protocol
//! state, the authenticated peer, the local message sequence counter, and
//! the expirations scheduled for requests still awaiting acknowledgement.

use oxidir_model::Replica;
use std::collections::BTreeMap;
use std::time::Instant;

/// Protocol state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Connected, not yet authenticated.
    Init,
    /// Logged in; eligible for replication rounds.
    Ready,
}

/// Mutable per-connection session state.
#[derive(Debug)]
pub struct ReplicationContext {
    /// Current protocol state.
    pub state: ContextState,
    /// The authenticated peer, set exactly once on successful login.
    pub peer: Option<Replica>,
    next_seq: u64,
    pending: BTreeMap<u64, Instant>,
    login_deadline: Option<Instant>,
}

impl ReplicationContext {
    /// Fresh context for a newly opened connection.
    pub fn new() -> Self {
        Self {
            state: ContextState::Init,
            peer: None,
            next_seq: 0,
            pending: BTreeMap::new(),
            login_deadline: None,
        }
    }

    /// Allocate the next outbound message sequence number.
    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Record that the request with `sequence` expects a response by
    /// `deadline`.
    pub fn expect_response(&mut self, sequence: u64, deadline: Instant) {
        self.pending.insert(sequence, deadline);
    }

    /// Clear the expiration for an answered request. Returns false when the
    /// sequence was not outstanding (a protocol violation for acks).
    pub fn acknowledge(&mut self, sequence: u64) -> bool {
        self.pending.remove(&sequence).is_some()
    }

    /// True while any request is still awaiting acknowledgement.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The sequence of the oldest request whose deadline has passed, if any.
    pub fn overdue(&self, now: Instant) -> Option<u64> {
        self.pending
            .iter()
            .find(|(_, deadline)| **deadline <= now)
            .map(|(seq, _)| *seq)
    }

    /// Arm the server-side login deadline (anti-hang while `Init`).
    pub fn arm_login_deadline(&mut self, deadline: Instant) {
        self.login_deadline = Some(deadline);
    }

    /// Disarm the login deadline after a successful login.
    pub fn clear_login_deadline(&mut self) {
        self.login_deadline = None;
    }

    /// True if the login deadline is armed and has passed.
    pub fn login_overdue(&self, now: Instant) -> bool {
        matches!(self.login_deadline, Some(deadline) if deadline <= now)
    }
}

impl Default for ReplicationContext {
    fn default() -> Self {
        Self::new()
    }
}
