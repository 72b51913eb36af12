//! Connection dispatch for the replication engine.
//!
//! The transport layer delivers lifecycle and message events here; the
//! service owns one context handler per connection and routes events to the
//! role that connection plays. It also owns the shared single-writer
//! transaction flag handed to every server-side handler, and the periodic
//! log retention pass.

use crate::client::ClientHandler;
use crate::config::ReplicationConfig;
use crate::error::ReplError;
use crate::message::ReplicationMessage;
use crate::partition::Partition;
use crate::server::{ServerHandler, TransactionFlag};
use crate::session::ReplicationSession;
use crate::store::ReplicationStore;
use dashmap::DashMap;
use oxidir_model::ReplicaId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Identifier of one live connection.
pub type ConnId = u64;

/// The role this instance plays on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// We connected out and drive replication rounds.
    Client,
    /// We accepted the connection and apply what the peer ships.
    Server,
}

enum PeerHandler {
    Client(Arc<ClientHandler>),
    Server(Arc<ServerHandler>),
}

impl Clone for PeerHandler {
    fn clone(&self) -> Self {
        match self {
            PeerHandler::Client(h) => PeerHandler::Client(Arc::clone(h)),
            PeerHandler::Server(h) => PeerHandler::Server(Arc::clone(h)),
        }
    }
}

struct ConnEntry {
    session: Arc<dyn ReplicationSession>,
    handler: PeerHandler,
}

/// Per-instance replication service: one per directory replica.
pub struct ReplicationService {
    config: Arc<ReplicationConfig>,
    store: ReplicationStore,
    partition: Arc<dyn Partition>,
    replica_in_transaction: TransactionFlag,
    connections: DashMap<ConnId, ConnEntry>,
    next_conn_id: AtomicU64,
}

impl ReplicationService {
    /// Create a service around this replica's store and partition.
    pub fn new(
        config: Arc<ReplicationConfig>,
        store: ReplicationStore,
        partition: Arc<dyn Partition>,
    ) -> Self {
        Self {
            config,
            store,
            partition,
            replica_in_transaction: Arc::new(Mutex::new(None)),
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// This replica's replication store.
    pub fn store(&self) -> &ReplicationStore {
        &self.store
    }

    /// This replica's configuration.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// The peer currently holding the incoming-write transaction, if any.
    pub async fn replica_in_transaction(&self) -> Option<ReplicaId> {
        *self.replica_in_transaction.lock().await
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// True while the connection is registered.
    pub fn is_open(&self, conn_id: ConnId) -> bool {
        self.connections.contains_key(&conn_id)
    }

    /// Register a newly established connection and run the role's opening
    /// action (client: login; server: arm the login deadline).
    pub async fn connection_opened(
        &self,
        session: Arc<dyn ReplicationSession>,
        role: PeerRole,
    ) -> Result<ConnId, ReplError> {
        let handler = match role {
            PeerRole::Client => PeerHandler::Client(Arc::new(ClientHandler::new(
                Arc::clone(&self.config),
                self.store.clone(),
                Arc::clone(&self.partition),
                Arc::clone(&session),
            ))),
            PeerRole::Server => PeerHandler::Server(Arc::new(ServerHandler::new(
                Arc::clone(&self.config),
                self.store.clone(),
                Arc::clone(&self.partition),
                Arc::clone(&session),
                Arc::clone(&self.replica_in_transaction),
            ))),
        };

        let opened = match &handler {
            PeerHandler::Client(h) => h.on_connect().await,
            PeerHandler::Server(h) => h.on_connect().await,
        };
        if let Err(e) = opened {
            tracing::warn!(error = %e, "connection rejected at open");
            session.close();
            return Err(e);
        }

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        self.connections.insert(conn_id, ConnEntry { session, handler });
        tracing::debug!(conn_id, ?role, "connection registered");
        Ok(conn_id)
    }

    /// Dispatch an inbound message. A handler error closes the connection;
    /// that is the single recovery boundary of the protocol.
    pub async fn message_received(
        &self,
        conn_id: ConnId,
        msg: ReplicationMessage,
    ) -> Result<(), ReplError> {
        let handler = match self.connections.get(&conn_id) {
            Some(entry) => entry.handler.clone(),
            None => {
                return Err(ReplError::Protocol {
                    msg: format!("message for unknown connection {conn_id}"),
                })
            }
        };

        let result = match &handler {
            PeerHandler::Client(h) => h.on_message(msg).await,
            PeerHandler::Server(h) => h.on_message(msg).await,
        };
        if let Err(e) = result {
            tracing::warn!(conn_id, error = %e, "closing connection after handler error");
            self.connection_closed(conn_id).await;
            return Err(e);
        }
        Ok(())
    }

    /// Periodic timer: client idle rounds and response expirations, server
    /// login deadlines. Failing connections are closed.
    pub async fn tick(&self, now: Instant) {
        let snapshot: Vec<(ConnId, PeerHandler)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.handler.clone()))
            .collect();

        for (conn_id, handler) in snapshot {
            let result = match &handler {
                PeerHandler::Client(h) => h.on_idle(now).await,
                PeerHandler::Server(h) => h.on_tick(now).await,
            };
            if let Err(e) = result {
                tracing::warn!(conn_id, error = %e, "closing connection on tick");
                self.connection_closed(conn_id).await;
            }
        }
    }

    /// Spawn the periodic driver: one [`ReplicationService::tick`] per
    /// configured replication interval, until the returned handle is
    /// aborted by the embedder's shutdown path.
    pub fn spawn_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                service.tick(tokio::time::Instant::now().into_std()).await;
                tokio::time::sleep(service.config.replication_interval()).await;
            }
        })
    }

    /// Deregister and close a connection, releasing anything it holds
    /// (notably the server transaction flag).
    pub async fn connection_closed(&self, conn_id: ConnId) {
        if let Some((_, entry)) = self.connections.remove(&conn_id) {
            match &entry.handler {
                PeerHandler::Client(h) => h.on_close().await,
                PeerHandler::Server(h) => h.on_close().await,
            }
            entry.session.close();
            tracing::debug!(conn_id, "connection closed");
        }
    }

    /// Retention pass: purge log entries past the configured age.
    pub async fn purge(&self, now_ms: u64) -> usize {
        self.store
            .purge_older_than(self.config.log_max_age(), now_ms)
            .await
    }
}
