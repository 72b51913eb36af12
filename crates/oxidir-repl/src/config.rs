//! Replication configuration: the local replica identity, the static peer
//! list, and the timers that drive rounds, response expiry and log
//! retention.

use crate::error::ReplError;
use oxidir_model::{Replica, ReplicaId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// A statically configured replication peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// The peer's replica id.
    pub replica_id: ReplicaId,
    /// The peer's address. Inbound login claims are validated against this,
    /// never against the claim alone.
    pub address: SocketAddr,
}

/// Configuration for one replica's replication engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// This replica's own identifier.
    pub replica_id: ReplicaId,
    /// Known peers (id and address).
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// How long to wait for a response to Login/BeginLogEntries/LogEntry
    /// before giving up on the connection, in milliseconds.
    pub response_timeout_ms: u64,
    /// Idle period between replication rounds, in milliseconds.
    pub replication_interval_ms: u64,
    /// Retention horizon for the replication log, in milliseconds. Entries
    /// older than this are purged, advancing the purge vector.
    pub log_max_age_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replica_id: 1,
            peers: Vec::new(),
            response_timeout_ms: 10_000,
            replication_interval_ms: 5_000,
            log_max_age_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

impl ReplicationConfig {
    /// Load configuration from a TOML or JSON file, decided by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ReplicationConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            other => anyhow::bail!("unsupported config extension: {other:?}"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency of the configuration.
    pub fn validate(&self) -> Result<(), ReplError> {
        if self.replica_id == 0 {
            return Err(ReplError::Config {
                msg: "replica_id must be nonzero".into(),
            });
        }
        if self.replication_interval_ms == 0 {
            return Err(ReplError::Config {
                msg: "replication_interval_ms must be nonzero".into(),
            });
        }
        if self.response_timeout_ms == 0 {
            return Err(ReplError::Config {
                msg: "response_timeout_ms must be nonzero".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for peer in &self.peers {
            if peer.replica_id == self.replica_id {
                return Err(ReplError::Config {
                    msg: format!("replica {} lists itself as a peer", self.replica_id),
                });
            }
            if !seen.insert(peer.replica_id) {
                return Err(ReplError::Config {
                    msg: format!("duplicate peer replica id {}", peer.replica_id),
                });
            }
        }
        Ok(())
    }

    /// Look up a configured peer by replica id.
    pub fn peer(&self, replica_id: ReplicaId) -> Option<Replica> {
        self.peers
            .iter()
            .find(|p| p.replica_id == replica_id)
            .map(|p| Replica::new(p.replica_id, p.address))
    }

    /// Response timeout as a [`Duration`].
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Replication interval as a [`Duration`].
    pub fn replication_interval(&self) -> Duration {
        Duration::from_millis(self.replication_interval_ms)
    }

    /// Log retention horizon as a [`Duration`].
    pub fn log_max_age(&self) -> Duration {
        Duration::from_millis(self.log_max_age_ms)
    }
}
