//! End-to-end replication rounds between two live services.
//!
//! Covers the full-transfer decision for a peer with no history, strictly
//! ordered incremental shipping, quiescent rounds, the refusal to ship
//! incrementally to a peer whose knowledge has fallen behind the local
//! purge watermark, and the spawned periodic driver.
