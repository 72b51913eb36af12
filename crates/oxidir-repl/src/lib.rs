#![warn(missing_docs)]

//! OxiDir replication engine: keeps autonomous directory replicas eventually
//! consistent by exchanging CSN-ordered change logs over session-oriented
//! connections.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod op;
pub mod partition;
pub mod server;
pub mod service;
pub mod session;
pub mod store;
pub mod telemetry;

pub use client::ClientHandler;
pub use config::{PeerConfig, ReplicationConfig};
pub use context::{ContextState, ReplicationContext};
pub use error::ReplError;
pub use message::{ReplicationMessage, ResponseCode};
pub use op::{AttributeMod, ModKind, Operation};
pub use partition::{EntryCursor, MemoryPartition, Partition};
pub use server::ServerHandler;
pub use service::{ConnId, PeerRole, ReplicationService};
pub use session::{ChannelSession, ReplicationSession};
pub use store::{LogCursor, ReplicationStore};
