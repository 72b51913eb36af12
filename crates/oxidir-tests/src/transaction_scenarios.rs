//! Single-writer serialization across connections.
//!
//! One service, several scripted peers: at most one peer may be inside a
//! replication round at a time, out-of-turn writers are refused without
//! being disconnected, and the write lock is released on round end and on
//! connection close.
