//! Replicated directory operations.
//!
//! Every committed mutation is one of these variants, tagged with the CSN
//! under which it was committed and the normalized DN it targets. The enum
//! is matched exhaustively everywhere; adding a variant is a
//! compile-checked change.

use crate::error::ReplError;
use crate::partition::Partition;
use crate::store::ReplicationStore;
use oxidir_model::{Csn, Dn, Entry};
use serde::{Deserialize, Serialize};

/// How an attribute modification changes the attribute's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModKind {
    /// Add the given values to the attribute.
    Add,
    /// Replace all values of the attribute.
    Replace,
    /// Remove the given values (all values when empty).
    Remove,
}

/// One attribute modification within a `Modify` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMod {
    /// The kind of change.
    pub kind: ModKind,
    /// Normalized attribute type.
    pub attribute: String,
    /// Values the change refers to.
    pub values: Vec<String>,
}

/// A serializable, executable directory mutation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Add a new entry. The entry carries its own DN.
    Add {
        /// Commit CSN.
        csn: Csn,
        /// The entry to add.
        entry: Entry,
    },
    /// Modify an existing entry's attributes.
    Modify {
        /// Commit CSN.
        csn: Csn,
        /// Target DN.
        dn: Dn,
        /// Attribute changes, applied in order.
        mods: Vec<AttributeMod>,
    },
    /// Delete an entry.
    Delete {
        /// Commit CSN.
        csn: Csn,
        /// Target DN.
        dn: Dn,
    },
    /// Rename an entry (and its subtree) to a new RDN and optionally a new
    /// superior.
    ModifyDn {
        /// Commit CSN.
        csn: Csn,
        /// Current DN.
        dn: Dn,
        /// New leading RDN.
        new_rdn: String,
        /// Whether the old RDN attribute value is removed.
        delete_old_rdn: bool,
        /// New parent DN; `None` keeps the current parent.
        new_superior: Option<Dn>,
    },
}

impl Operation {
    /// The CSN under which this operation was committed.
    pub fn csn(&self) -> &Csn {
        match self {
            Operation::Add { csn, .. }
            | Operation::Modify { csn, .. }
            | Operation::Delete { csn, .. }
            | Operation::ModifyDn { csn, .. } => csn,
        }
    }

    /// The DN this operation targets.
    pub fn dn(&self) -> &Dn {
        match self {
            Operation::Add { entry, .. } => &entry.dn,
            Operation::Modify { dn, .. }
            | Operation::Delete { dn, .. }
            | Operation::ModifyDn { dn, .. } => dn,
        }
    }

    /// Short static name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Add { .. } => "Add",
            Operation::Modify { .. } => "Modify",
            Operation::Delete { .. } => "Delete",
            Operation::ModifyDn { .. } => "ModifyDn",
        }
    }

    /// Apply this operation to the directory partition and record it in the
    /// replication store.
    ///
    /// The append only happens after a successful apply, so a mutation is
    /// never logged without having taken effect; callers must not send an
    /// acknowledgement referencing this operation until `execute` returns.
    pub async fn execute(
        &self,
        partition: &dyn Partition,
        store: &ReplicationStore,
    ) -> Result<(), ReplError> {
        partition.apply(self).await?;
        store.append(self.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::MemoryPartition;

    fn csn(ts: u64, seq: u32) -> Csn {
        Csn::new(ts, 1, seq)
    }

    fn add_op(ts: u64, seq: u32, dn: &str) -> Operation {
        Operation::Add {
            csn: csn(ts, seq),
            entry: Entry::new(Dn::new(dn), csn(ts, seq))
                .with_attribute("objectclass", vec!["top".into()]),
        }
    }

    #[test]
    fn test_accessors() {
        let op = add_op(10, 0, "dc=example");
        assert_eq!(op.csn(), &csn(10, 0));
        assert_eq!(op.dn(), &Dn::new("dc=example"));
        assert_eq!(op.kind(), "Add");

        let del = Operation::Delete {
            csn: csn(11, 0),
            dn: Dn::new("cn=x,dc=example"),
        };
        assert_eq!(del.dn(), &Dn::new("cn=x,dc=example"));
        assert_eq!(del.kind(), "Delete");
    }

    #[test]
    fn test_serde_roundtrip_all_variants() {
        let ops = vec![
            add_op(1, 0, "dc=example"),
            Operation::Modify {
                csn: csn(2, 0),
                dn: Dn::new("dc=example"),
                mods: vec![AttributeMod {
                    kind: ModKind::Replace,
                    attribute: "description".into(),
                    values: vec!["x".into()],
                }],
            },
            Operation::Delete {
                csn: csn(3, 0),
                dn: Dn::new("dc=example"),
            },
            Operation::ModifyDn {
                csn: csn(4, 0),
                dn: Dn::new("ou=a,dc=example"),
                new_rdn: "ou=b".into(),
                delete_old_rdn: true,
                new_superior: None,
            },
        ];
        for op in ops {
            let bytes = bincode::serialize(&op).unwrap();
            let back: Operation = bincode::deserialize(&bytes).unwrap();
            assert_eq!(op, back);
        }
    }

    #[tokio::test]
    async fn test_execute_applies_then_logs() {
        let partition = MemoryPartition::new(vec![Dn::new("dc=example")]);
        let store = ReplicationStore::new(1);

        let op = add_op(10, 0, "dc=example");
        op.execute(&partition, &store).await.unwrap();

        assert!(partition.lookup(&Dn::new("dc=example")).await.is_some());
        assert_eq!(store.update_vector().await.get(1), Some(&csn(10, 0)));
    }

    #[tokio::test]
    async fn test_execute_failure_leaves_store_untouched() {
        let partition = MemoryPartition::new(vec![Dn::new("dc=example")]);
        let store = ReplicationStore::new(1);

        // Modify of a nonexistent entry fails in the partition.
        let op = Operation::Modify {
            csn: csn(10, 0),
            dn: Dn::new("cn=missing,dc=example"),
            mods: vec![],
        };
        assert!(op.execute(&partition, &store).await.is_err());
        assert!(store.update_vector().await.is_empty());
    }
}
