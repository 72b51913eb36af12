//! The directory partition seam.
//!
//! The replication engine never touches storage directly; it executes
//! operations through [`Partition`] and walks subtrees through
//! [`EntryCursor`] during full transfer. [`MemoryPartition`] is the
//! in-memory backend used by tests and single-process deployments; the
//! production partition implements the same trait over the storage engine.

use crate::error::ReplError;
use crate::op::{AttributeMod, ModKind, Operation};
use async_trait::async_trait;
use oxidir_model::{Dn, Entry, FlatSchema, SchemaView};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A directory partition the replication engine can mutate and enumerate.
#[async_trait]
pub trait Partition: Send + Sync {
    /// Apply one replicated operation to the partition.
    async fn apply(&self, op: &Operation) -> Result<(), ReplError>;

    /// The suffixes (naming contexts) this partition serves.
    async fn naming_contexts(&self) -> Vec<Dn>;

    /// All entries at or under `base`, as a closeable cursor.
    async fn search_subtree(&self, base: &Dn) -> Result<EntryCursor, ReplError>;
}

/// A finite, forward-only cursor over directory entries.
#[derive(Debug)]
pub struct EntryCursor {
    items: Vec<Entry>,
    index: usize,
    closed: bool,
}

impl EntryCursor {
    /// Wrap an already-materialized result set.
    pub fn from_entries(items: Vec<Entry>) -> Self {
        Self {
            items,
            index: 0,
            closed: false,
        }
    }

    /// The next entry, or `None` at the end.
    pub async fn next(&mut self) -> Option<Entry> {
        if self.closed || self.index >= self.items.len() {
            return None;
        }
        let entry = self.items[self.index].clone();
        self.index += 1;
        Some(entry)
    }

    /// Release the cursor. Further `next` calls return `None`.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

/// In-memory partition keyed by normalized DN.
#[derive(Clone)]
pub struct MemoryPartition {
    naming_contexts: Vec<Dn>,
    schema: Arc<dyn SchemaView>,
    entries: Arc<Mutex<BTreeMap<Dn, Entry>>>,
}

impl MemoryPartition {
    /// Create an empty partition serving the given naming contexts, with
    /// the case-folding baseline schema.
    pub fn new(naming_contexts: Vec<Dn>) -> Self {
        Self::with_schema(naming_contexts, Arc::new(FlatSchema))
    }

    /// Create an empty partition normalizing names through `schema`.
    pub fn with_schema(naming_contexts: Vec<Dn>, schema: Arc<dyn SchemaView>) -> Self {
        Self {
            naming_contexts,
            schema,
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Fetch one entry by DN.
    pub async fn lookup(&self, dn: &Dn) -> Option<Entry> {
        self.entries.lock().await.get(dn).cloned()
    }

    /// Number of entries held.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True if the partition holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn apply_mods(&self, entry: &mut Entry, mods: &[AttributeMod]) {
        for m in mods {
            let attribute = self.schema.normalize_attribute(&m.attribute);
            match m.kind {
                ModKind::Add => {
                    let values = entry.attributes.entry(attribute).or_default();
                    for v in &m.values {
                        if !values.contains(v) {
                            values.push(v.clone());
                        }
                    }
                }
                ModKind::Replace => {
                    if m.values.is_empty() {
                        entry.attributes.remove(&attribute);
                    } else {
                        entry.attributes.insert(attribute, m.values.clone());
                    }
                }
                ModKind::Remove => {
                    if m.values.is_empty() {
                        entry.attributes.remove(&attribute);
                    } else if let Some(values) = entry.attributes.get_mut(&attribute) {
                        values.retain(|v| !m.values.contains(v));
                        if values.is_empty() {
                            entry.attributes.remove(&attribute);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Partition for MemoryPartition {
    async fn apply(&self, op: &Operation) -> Result<(), ReplError> {
        let mut entries = self.entries.lock().await;
        match op {
            Operation::Add { csn, entry } => {
                // Last writer by CSN wins on a colliding add.
                match entries.get(&entry.dn) {
                    Some(existing) if existing.csn > *csn => {
                        tracing::debug!(dn = %entry.dn, "ignoring add older than current entry");
                    }
                    _ => {
                        let mut entry = entry.clone();
                        entry.csn = *csn;
                        entries.insert(entry.dn.clone(), entry);
                    }
                }
                Ok(())
            }
            Operation::Modify { csn, dn, mods } => {
                let entry = entries.get_mut(dn).ok_or_else(|| ReplError::Apply {
                    dn: dn.to_string(),
                    msg: "no such entry".into(),
                })?;
                self.apply_mods(entry, mods);
                if *csn > entry.csn {
                    entry.csn = *csn;
                }
                Ok(())
            }
            Operation::Delete { dn, .. } => {
                entries.remove(dn).ok_or_else(|| ReplError::Apply {
                    dn: dn.to_string(),
                    msg: "no such entry".into(),
                })?;
                Ok(())
            }
            Operation::ModifyDn {
                csn,
                dn,
                new_rdn,
                delete_old_rdn,
                new_superior,
            } => {
                if !entries.contains_key(dn) {
                    return Err(ReplError::Apply {
                        dn: dn.to_string(),
                        msg: "no such entry".into(),
                    });
                }
                let parent = match new_superior {
                    Some(superior) => superior.clone(),
                    None => dn.parent().ok_or_else(|| ReplError::Apply {
                        dn: dn.to_string(),
                        msg: "cannot rename a context root without a new superior".into(),
                    })?,
                };
                let new_dn = self.schema.normalize_dn(&format!("{},{}", new_rdn, parent));

                // Move the entry and every descendant to the new base.
                let moved: Vec<Dn> = entries
                    .keys()
                    .filter(|k| *k == dn || k.is_descendant_of(dn))
                    .cloned()
                    .collect();
                for old in moved {
                    let Some(mut entry) = entries.remove(&old) else {
                        continue;
                    };
                    let Some(rebased) = old.rebase(dn, &new_dn) else {
                        entries.insert(old, entry);
                        continue;
                    };
                    entry.dn = rebased.clone();
                    if old == *dn {
                        if *delete_old_rdn {
                            if let Some((at, value)) = dn.rdn().split_once('=') {
                                if let Some(values) = entry.attributes.get_mut(at) {
                                    values.retain(|v| v != value);
                                    if values.is_empty() {
                                        entry.attributes.remove(at);
                                    }
                                }
                            }
                        }
                        if let Some((at, value)) = new_rdn.split_once('=') {
                            let at = self.schema.normalize_attribute(at);
                            let value = value.trim().to_string();
                            let values = entry.attributes.entry(at).or_default();
                            if !values.contains(&value) {
                                values.push(value);
                            }
                        }
                        if *csn > entry.csn {
                            entry.csn = *csn;
                        }
                    }
                    entries.insert(rebased, entry);
                }
                Ok(())
            }
        }
    }

    async fn naming_contexts(&self) -> Vec<Dn> {
        self.naming_contexts.clone()
    }

    async fn search_subtree(&self, base: &Dn) -> Result<EntryCursor, ReplError> {
        let entries = self.entries.lock().await;
        let items: Vec<Entry> = entries
            .values()
            .filter(|e| e.dn == *base || e.dn.is_descendant_of(base))
            .cloned()
            .collect();
        Ok(EntryCursor::from_entries(items))
    }
}
