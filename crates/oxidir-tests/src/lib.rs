//! OxiDir Test & Validation Infrastructure
//!
//! In-process multi-replica harness plus the replication scenario suites:
//! full transfer, incremental shipping, purge-watermark refusal, and
//! single-writer transaction serialization across connections.

pub mod harness;
pub mod repl_scenarios;
pub mod transaction_scenarios;

pub use harness::{ScriptedPeer, TestLink, TestReplica, Transcript};
