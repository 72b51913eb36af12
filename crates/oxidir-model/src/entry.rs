//! Distinguished names and directory entries.
//!
//! DNs are stored in a normalized string form (lowercased, single-space-free
//! separators) so replicas with different casing conventions agree on entry
//! identity. Normalization against the full schema happens through a
//! [`crate::schema::SchemaView`]; the `Dn` constructor applies the flat
//! baseline fold that every schema shares.

use crate::csn::Csn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A normalized distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dn(String);

impl Dn {
    /// Normalize and wrap a DN string.
    pub fn new(raw: &str) -> Self {
        let normalized = raw
            .split(',')
            .map(|rdn| rdn.trim().to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        Self(normalized)
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The parent DN, or `None` for a single-RDN (context root) DN.
    pub fn parent(&self) -> Option<Dn> {
        self.0.split_once(',').map(|(_, rest)| Dn(rest.to_string()))
    }

    /// The leading relative distinguished name.
    pub fn rdn(&self) -> &str {
        self.0.split(',').next().unwrap_or(&self.0)
    }

    /// True if `self` sits strictly below `ancestor` in the tree.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self != ancestor && self.0.ends_with(&format!(",{}", ancestor.0))
    }

    /// Rebase this DN from `old_base` onto `new_base`, used by subtree
    /// renames. Returns `None` when `self` is not under `old_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        if self == old_base {
            return Some(new_base.clone());
        }
        if !self.is_descendant_of(old_base) {
            return None;
        }
        let prefix_len = self.0.len() - old_base.0.len() - 1;
        let prefix = &self.0[..prefix_len];
        Some(Dn(format!("{},{}", prefix, new_base.0)))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dn {
    fn from(raw: &str) -> Self {
        Dn::new(raw)
    }
}

/// A directory entry as seen by the replication engine: its DN, the CSN of
/// its latest committed change, and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Normalized distinguished name.
    pub dn: Dn,
    /// CSN of the change that produced this entry state. Full transfer tags
    /// the synthetic Add for this entry with exactly this CSN.
    pub csn: Csn,
    /// Attribute type (normalized) to values.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// Create an entry with no attributes.
    pub fn new(dn: Dn, csn: Csn) -> Self {
        Self {
            dn,
            csn,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with_attribute(mut self, attribute: &str, values: Vec<String>) -> Self {
        self.attributes
            .insert(attribute.to_ascii_lowercase(), values);
        self
    }

    /// Values of an attribute, if present.
    pub fn get(&self, attribute: &str) -> Option<&Vec<String>> {
        self.attributes.get(&attribute.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dn_normalization() {
        let dn = Dn::new("CN=Admin , OU=People,DC=Example,DC=Com");
        assert_eq!(dn.as_str(), "cn=admin,ou=people,dc=example,dc=com");
        assert_eq!(dn, Dn::new("cn=admin,ou=people,dc=example,dc=com"));
    }

    #[test]
    fn test_dn_parent_and_rdn() {
        let dn = Dn::new("cn=admin,ou=people,dc=example");
        assert_eq!(dn.rdn(), "cn=admin");
        assert_eq!(dn.parent(), Some(Dn::new("ou=people,dc=example")));
        assert_eq!(Dn::new("dc=example").parent(), None);
    }

    #[test]
    fn test_descendant() {
        let base = Dn::new("dc=example");
        let child = Dn::new("ou=people,dc=example");
        let deep = Dn::new("cn=x,ou=people,dc=example");
        let other = Dn::new("dc=other");
        assert!(child.is_descendant_of(&base));
        assert!(deep.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(!other.is_descendant_of(&base));
        // Suffix of the string but not of the tree.
        assert!(!Dn::new("dc=bexample").is_descendant_of(&base));
    }

    #[test]
    fn test_rebase() {
        let old = Dn::new("ou=people,dc=example");
        let new = Dn::new("ou=staff,dc=example");
        let deep = Dn::new("cn=x,ou=people,dc=example");
        assert_eq!(
            deep.rebase(&old, &new),
            Some(Dn::new("cn=x,ou=staff,dc=example"))
        );
        assert_eq!(old.rebase(&old, &new), Some(new.clone()));
        assert_eq!(Dn::new("dc=other").rebase(&old, &new), None);
    }

    #[test]
    fn test_entry_attributes_case_insensitive() {
        let entry = Entry::new(Dn::new("dc=example"), Csn::new(1, 1, 0))
            .with_attribute("ObjectClass", vec!["domain".into()]);
        assert_eq!(entry.get("objectclass"), Some(&vec!["domain".to_string()]));
        assert_eq!(entry.get("OBJECTCLASS"), Some(&vec!["domain".to_string()]));
        assert!(entry.get("cn").is_none());
    }
}
