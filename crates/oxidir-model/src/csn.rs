//! Change Sequence Numbers: the logical timestamps that tag every committed
//! directory change.
//!
//! A CSN totally orders changes across all replicas: wall-clock millisecond
//! first, then originating replica id, then a per-replica counter that
//! disambiguates same-millisecond changes from the same replica.

use crate::replica::ReplicaId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Change Sequence Number identifying one committed change.
///
/// Field order matters: the derived `Ord` compares `timestamp_ms`, then
/// `replica_id`, then `seq`, which is exactly the protocol's total order.
/// CSNs are immutable once issued and travel unchanged with the operation
/// they tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Csn {
    /// Coarse wall-clock time of the change, milliseconds since Unix epoch.
    pub timestamp_ms: u64,
    /// The replica that issued this CSN.
    pub replica_id: ReplicaId,
    /// Per-replica counter disambiguating same-millisecond changes.
    pub seq: u32,
}

impl Csn {
    /// Create a CSN from its raw parts.
    pub fn new(timestamp_ms: u64, replica_id: ReplicaId, seq: u32) -> Self {
        Self {
            timestamp_ms,
            replica_id,
            seq,
        }
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.timestamp_ms, self.replica_id, self.seq)
    }
}

/// Error returned when parsing a CSN from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed CSN: {input}")]
pub struct ParseCsnError {
    /// The string that failed to parse.
    pub input: String,
}

impl FromStr for Csn {
    type Err = ParseCsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCsnError {
            input: s.to_string(),
        };
        let mut parts = s.split('.');
        let timestamp_ms = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let replica_id = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let seq = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Csn::new(timestamp_ms, replica_id, seq))
    }
}

/// Issues strictly increasing CSNs for the local replica.
///
/// Same-millisecond requests bump the counter; a wall clock that moves
/// backwards is clamped to the last issued timestamp so the local sequence
/// never regresses.
#[derive(Debug)]
pub struct CsnFactory {
    replica_id: ReplicaId,
    last: Option<Csn>,
}

impl CsnFactory {
    /// Create a factory for the given local replica.
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            last: None,
        }
    }

    /// The replica this factory issues CSNs for.
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// The most recently issued CSN, if any.
    pub fn last_issued(&self) -> Option<Csn> {
        self.last
    }

    /// Issue the next CSN for the given wall-clock reading.
    pub fn issue(&mut self, now_ms: u64) -> Csn {
        let csn = match self.last {
            Some(last) if now_ms <= last.timestamp_ms => {
                Csn::new(last.timestamp_ms, self.replica_id, last.seq + 1)
            }
            _ => Csn::new(now_ms, self.replica_id, 0),
        };
        self.last = Some(csn);
        csn
    }
}
