//! The replication store: an append-only, CSN-ordered log of applied
//! operations, scoped to one directory instance.
//!
//! The store owns the update vector (newest recorded CSN per replica) and
//! the purge vector (oldest CSN per replica still obtainable after
//! retention). This implementation keeps the log in memory; a disk-backed
//! log with the same contract replaces the inner map later. Appends are
//! durable before `append` returns, which in memory is trivially true;
//! callers still must not acknowledge an operation before `append` has
//! returned.

use crate::error::ReplError;
use crate::op::Operation;
use oxidir_model::{Csn, CsnVector, ReplicaId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
struct StoreInner {
    log: BTreeMap<Csn, Operation>,
    update_vector: CsnVector,
    purge_vector: CsnVector,
}

/// Append-only, CSN-ordered replication log for one directory instance.
#[derive(Debug, Clone)]
pub struct ReplicationStore {
    replica_id: ReplicaId,
    inner: Arc<Mutex<StoreInner>>,
    open_cursors: Arc<AtomicUsize>,
}

impl ReplicationStore {
    /// Create an empty store for the given local replica.
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            inner: Arc::new(Mutex::new(StoreInner {
                log: BTreeMap::new(),
                update_vector: CsnVector::new(),
                purge_vector: CsnVector::new(),
            })),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The local replica this store belongs to.
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Snapshot of the update vector: newest recorded CSN per replica.
    pub async fn update_vector(&self) -> CsnVector {
        self.inner.lock().await.update_vector.clone()
    }

    /// Snapshot of the purge vector: oldest still-obtainable CSN per
    /// replica. Invariant: `PV[r] <= UV[r]` for every replica present in
    /// both.
    pub async fn purge_vector(&self) -> CsnVector {
        self.inner.lock().await.purge_vector.clone()
    }

    /// Number of operations currently retained in the log.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.log.len()
    }

    /// True if no operations are retained.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.log.is_empty()
    }

    /// Number of cursors currently open against this store.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Record an applied operation.
    ///
    /// Idempotent: an operation whose CSN is already covered by the update
    /// vector is skipped, so re-applying a sequence the store has recorded
    /// never changes the update vector. The first operation seen from a
    /// replica seeds that replica's purge watermark.
    pub async fn append(&self, op: Operation) -> Result<(), ReplError> {
        let mut inner = self.inner.lock().await;
        let csn = *op.csn();

        if let Some(known) = inner.update_vector.get(csn.replica_id) {
            if *known >= csn {
                tracing::debug!(csn = %csn, kind = op.kind(), "skipping already-recorded operation");
                return Ok(());
            }
        }

        if inner.purge_vector.get(csn.replica_id).is_none() {
            inner.purge_vector.set(csn);
        }
        inner.update_vector.record(csn);
        inner.log.insert(csn, op);
        Ok(())
    }

    /// Open a forward cursor over operations strictly newer than
    /// `from_vector`'s entry for their originating replica (operations from
    /// replicas absent in the vector are all included), in CSN order.
    ///
    /// With `changes_only`, successive surviving operations against the same
    /// DN are coalesced down to the newest one, shrinking catch-up traffic
    /// for hot entries.
    pub async fn iterate(&self, from_vector: &CsnVector, changes_only: bool) -> LogCursor {
        let inner = self.inner.lock().await;
        let mut selected: Vec<Operation> = inner
            .log
            .iter()
            .filter(|(csn, _)| match from_vector.get(csn.replica_id) {
                Some(seen) => *csn > seen,
                None => true,
            })
            .map(|(_, op)| op.clone())
            .collect();

        if changes_only {
            // Keep only the newest operation per DN; the log map already
            // yields CSN order, so later wins.
            let mut newest: BTreeMap<oxidir_model::Dn, usize> = BTreeMap::new();
            for (i, op) in selected.iter().enumerate() {
                newest.insert(op.dn().clone(), i);
            }
            let mut keep: Vec<usize> = newest.into_values().collect();
            keep.sort_unstable();
            selected = keep.into_iter().map(|i| selected[i].clone()).collect();
        }

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        LogCursor {
            items: selected,
            index: 0,
            open_cursors: Arc::clone(&self.open_cursors),
            closed: false,
        }
    }

    /// Drop operations older than the retention horizon, advancing the
    /// purge vector. Returns the number of operations removed.
    ///
    /// The watermark per replica moves to the oldest retained CSN, or to the
    /// update vector's entry when nothing from that replica survives; it
    /// never moves past the update vector, so a recorded-but-unpurgeable
    /// change is never claimed discarded.
    pub async fn purge_older_than(&self, max_age: Duration, now_ms: u64) -> usize {
        let horizon = now_ms.saturating_sub(max_age.as_millis() as u64);
        let mut inner = self.inner.lock().await;

        let before = inner.log.len();
        inner.log.retain(|csn, _| csn.timestamp_ms >= horizon);
        let removed = before - inner.log.len();
        if removed == 0 {
            return 0;
        }

        let replicas: Vec<ReplicaId> = inner.update_vector.replica_ids().collect();
        for replica_id in replicas {
            let oldest_retained = inner
                .log
                .keys()
                .find(|csn| csn.replica_id == replica_id)
                .copied();
            let watermark = match oldest_retained {
                Some(csn) => csn,
                None => match inner.update_vector.get(replica_id) {
                    Some(uv) => *uv,
                    None => continue,
                },
            };
            inner.purge_vector.set(watermark);
        }

        tracing::info!(removed, horizon_ms = horizon, "purged replication log");
        removed
    }
}

/// A lazy, finite, forward-only cursor over the replication log.
///
/// Cursors hold an iteration slot against the store; they are released on
/// [`LogCursor::close`] or on drop, whichever comes first.
#[derive(Debug)]
pub struct LogCursor {
    items: Vec<Operation>,
    index: usize,
    open_cursors: Arc<AtomicUsize>,
    closed: bool,
}

impl LogCursor {
    /// The next operation in CSN order, or `None` at the end. Advancing may
    /// perform I/O in a disk-backed store, hence async.
    pub async fn next(&mut self) -> Option<Operation> {
        if self.closed || self.index >= self.items.len() {
            return None;
        }
        let op = self.items[self.index].clone();
        self.index += 1;
        Some(op)
    }

    /// Number of operations this cursor will yield in total.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the cursor yields nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Release the cursor's iteration slot.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for LogCursor {
    fn drop(&mut self) {
        self.close();
    }
}
