//! Per-replica CSN vectors.
//!
//! The same type plays two roles in the replication store:
//!
//! - *Update Vector (UV)*: for each known replica, the newest CSN from that
//!   replica reflected in the local store.
//! - *Purge Vector (PV)*: for each known replica, the oldest CSN from that
//!   replica the store can still supply (retention watermark).
//!
//! Vectors are value objects exchanged wholesale over the wire; there is no
//! mutation beyond construction and pointwise merge.

use crate::csn::Csn;
use crate::replica::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mapping from replica id to a single CSN, with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsnVector {
    entries: BTreeMap<ReplicaId, Csn>,
}

impl CsnVector {
    /// Create an empty vector.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build a vector from (replica, CSN) pairs. Later pairs for the same
    /// replica win.
    pub fn from_entries(entries: impl IntoIterator<Item = Csn>) -> Self {
        let mut v = Self::new();
        for csn in entries {
            v.record(csn);
        }
        v
    }

    /// The CSN recorded for a replica, or `None` for a never-seen replica.
    pub fn get(&self, replica_id: ReplicaId) -> Option<&Csn> {
        self.entries.get(&replica_id)
    }

    /// The set of replicas this vector knows about.
    pub fn replica_ids(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.entries.keys().copied()
    }

    /// Record a CSN, keeping the newer of the existing and given value for
    /// the CSN's originating replica.
    pub fn record(&mut self, csn: Csn) {
        match self.entries.get(&csn.replica_id) {
            Some(existing) if *existing >= csn => {}
            _ => {
                self.entries.insert(csn.replica_id, csn);
            }
        }
    }

    /// Overwrite the entry for the CSN's replica unconditionally.
    ///
    /// `record` keeps the maximum, which is right for update vectors; purge
    /// watermarks move forward past older values and need a plain store.
    pub fn set(&mut self, csn: Csn) {
        self.entries.insert(csn.replica_id, csn);
    }

    /// Pointwise merge: for each replica keep the newer CSN of the two.
    pub fn merge(&mut self, other: &CsnVector) {
        for csn in other.entries.values() {
            self.record(*csn);
        }
    }

    /// True if for every replica in `other`, this vector has a CSN that is
    /// at least as new.
    pub fn covers(&self, other: &CsnVector) -> bool {
        other
            .entries
            .iter()
            .all(|(id, csn)| matches!(self.entries.get(id), Some(mine) if mine >= csn))
    }

    /// True if no replica is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of replicas known to this vector.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over (replica, CSN) entries in replica-id order.
    pub fn iter(&self) -> impl Iterator<Item = (ReplicaId, &Csn)> {
        self.entries.iter().map(|(id, csn)| (*id, csn))
    }
}
