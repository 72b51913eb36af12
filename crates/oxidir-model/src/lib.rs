#![warn(missing_docs)]

//! OxiDir data model: change sequence numbers, CSN vectors, replica identity,
//! and the DN/entry types shared by the directory core and the replication
//! engine.

pub mod csn;
pub mod entry;
pub mod replica;
pub mod schema;
pub mod vector;

pub use csn::{Csn, CsnFactory};
pub use entry::{Dn, Entry};
pub use replica::{Replica, ReplicaId};
pub use schema::{FlatSchema, SchemaView};
pub use vector::CsnVector;
