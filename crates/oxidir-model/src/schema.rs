//! Read-only view of the schema/registry subsystem.
//!
//! The replication engine does not own schema resolution; it only needs to
//! normalize attribute names and DNs, and to know which attribute of the
//! root DSE advertises the naming contexts. This trait is the narrow seam
//! to the real registry; [`FlatSchema`] is the case-fold baseline used in
//! tests and in deployments without a loaded schema.

use crate::entry::Dn;

/// Attribute of the root DSE listing the partition suffixes this directory
/// serves. The engine never publishes the root DSE itself; the canonical
/// name is pinned here so schema implementations and the embedding server
/// advertise the suffixes under the same attribute.
pub const NAMING_CONTEXTS_AT: &str = "namingcontexts";

/// Resolves attribute identifiers and normalizes names. Read-only.
pub trait SchemaView: Send + Sync {
    /// Normalize an attribute type name to its canonical form.
    fn normalize_attribute(&self, name: &str) -> String;

    /// Normalize a DN string to its canonical form.
    fn normalize_dn(&self, dn: &str) -> Dn;

    /// The canonical name of the naming-contexts attribute. Consumed by the
    /// embedding server when it builds its root DSE; a registry-backed
    /// implementation may override it with a schema-resolved alias.
    fn naming_contexts_attribute(&self) -> &str {
        NAMING_CONTEXTS_AT
    }
}

/// Schema view that folds case and trims whitespace, with no alias or OID
/// resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSchema;

impl SchemaView for FlatSchema {
    fn normalize_attribute(&self, name: &str) -> String {
        name.trim().to_ascii_lowercase()
    }

    fn normalize_dn(&self, dn: &str) -> Dn {
        Dn::new(dn)
    }
}
