//! Responder side of the replication protocol.
//!
//! The server authenticates inbound peers symmetrically to the client,
//! then serializes incoming replication rounds through a single
//! cross-connection transaction flag: at most one peer may be writing to
//! the local store and partition at any time. The flag is shared state
//! owned by the dispatch service and passed in explicitly, never reached
//! through aliasing.

use crate::config::ReplicationConfig;
use crate::context::{ContextState, ReplicationContext};
use crate::error::ReplError;
use crate::message::{ReplicationMessage, ResponseCode};
use crate::op::Operation;
use crate::partition::Partition;
use crate::session::ReplicationSession;
use crate::store::ReplicationStore;
use oxidir_model::ReplicaId;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// The cross-connection "replica currently in transaction" flag.
pub type TransactionFlag = Arc<Mutex<Option<ReplicaId>>>;

/// Drives one inbound replication connection.
pub struct ServerHandler {
    config: Arc<ReplicationConfig>,
    store: ReplicationStore,
    partition: Arc<dyn Partition>,
    session: Arc<dyn ReplicationSession>,
    context: Mutex<ReplicationContext>,
    replica_in_transaction: TransactionFlag,
}

impl ServerHandler {
    /// Create a handler for a freshly accepted inbound connection.
    pub fn new(
        config: Arc<ReplicationConfig>,
        store: ReplicationStore,
        partition: Arc<dyn Partition>,
        session: Arc<dyn ReplicationSession>,
        replica_in_transaction: TransactionFlag,
    ) -> Self {
        Self {
            config,
            store,
            partition,
            session,
            context: Mutex::new(ReplicationContext::new()),
            replica_in_transaction,
        }
    }

    /// Current protocol state (for dispatch-layer introspection and tests).
    pub async fn state(&self) -> ContextState {
        self.context.lock().await.state
    }

    /// Connection accepted: the peer must log in before the response
    /// timeout elapses.
    pub async fn on_connect(&self) -> Result<(), ReplError> {
        let mut ctx = self.context.lock().await;
        ctx.arm_login_deadline(Instant::now() + self.config.response_timeout());
        Ok(())
    }

    /// Periodic tick: enforce the login deadline while unauthenticated.
    pub async fn on_tick(&self, now: Instant) -> Result<(), ReplError> {
        let ctx = self.context.lock().await;
        if ctx.state == ContextState::Init && ctx.login_overdue(now) {
            tracing::warn!(remote = %self.session.remote_addr(), "peer never logged in");
            return Err(ReplError::LoginTimeout);
        }
        Ok(())
    }

    /// Handle one inbound message.
    pub async fn on_message(&self, msg: ReplicationMessage) -> Result<(), ReplError> {
        match msg {
            ReplicationMessage::Login {
                sequence,
                replica_id,
            } => self.handle_login(sequence, replica_id).await,
            ReplicationMessage::BeginLogEntries { sequence } => {
                self.handle_begin(sequence).await
            }
            ReplicationMessage::LogEntry {
                sequence,
                operation,
            } => self.handle_log_entry(sequence, operation).await,
            ReplicationMessage::EndLogEntries { sequence } => self.handle_end(sequence).await,
            other => {
                tracing::warn!(kind = other.kind(), "message not valid for responder role");
                Err(ReplError::Protocol {
                    msg: format!("unexpected {} on server connection", other.kind()),
                })
            }
        }
    }

    /// Connection closed: release the transaction flag if this peer holds
    /// it, so an abandoned session can never lock other peers out.
    pub async fn on_close(&self) {
        let peer_id = self.context.lock().await.peer.as_ref().map(|p| p.id);
        if let Some(peer_id) = peer_id {
            let mut txn = self.replica_in_transaction.lock().await;
            if *txn == Some(peer_id) {
                tracing::info!(replica_id = peer_id, "releasing transaction held by closed connection");
                *txn = None;
            }
        }
    }

    async fn handle_login(&self, sequence: u64, replica_id: ReplicaId) -> Result<(), ReplError> {
        let mut ctx = self.context.lock().await;
        if ctx.state != ContextState::Init {
            return Err(ReplError::Protocol {
                msg: "Login on an authenticated connection".into(),
            });
        }

        let actual = self.session.remote_addr();
        let auth = match self.config.peer(replica_id) {
            None => Err(ReplError::UnknownReplica { replica_id }),
            Some(peer) if peer.address != actual => Err(ReplError::AddressMismatch {
                replica_id,
                expected: peer.address,
                actual,
            }),
            Some(peer) => Ok(peer),
        };

        match auth {
            Ok(peer) => {
                self.session
                    .send(ReplicationMessage::LoginAck {
                        sequence,
                        response_code: ResponseCode::Ok,
                        replica_id: self.config.replica_id,
                    })
                    .await?;
                tracing::info!(replica_id, address = %peer.address, "peer logged in");
                ctx.peer = Some(peer);
                ctx.state = ContextState::Ready;
                ctx.clear_login_deadline();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(replica_id, remote = %actual, error = %e, "login rejected");
                self.session
                    .send(ReplicationMessage::LoginAck {
                        sequence,
                        response_code: ResponseCode::NotOk,
                        replica_id: self.config.replica_id,
                    })
                    .await?;
                Err(e)
            }
        }
    }

    async fn handle_begin(&self, sequence: u64) -> Result<(), ReplError> {
        let peer_id = self.ready_peer().await?;

        let mut txn = self.replica_in_transaction.lock().await;
        if txn.is_some() {
            // Lock contention is not an error: the initiator retries on its
            // next idle tick.
            tracing::debug!(
                holder = txn.unwrap_or_default(),
                requester = peer_id,
                "round refused, transaction in progress"
            );
            return self
                .session
                .send(ReplicationMessage::BeginLogEntriesAck {
                    sequence,
                    response_code: ResponseCode::NotOk,
                    purge_vector: None,
                    update_vector: None,
                })
                .await;
        }

        let purge_vector = self.store.purge_vector().await;
        let update_vector = self.store.update_vector().await;
        *txn = Some(peer_id);
        tracing::debug!(replica_id = peer_id, "round granted");
        self.session
            .send(ReplicationMessage::BeginLogEntriesAck {
                sequence,
                response_code: ResponseCode::Ok,
                purge_vector: Some(purge_vector),
                update_vector: Some(update_vector),
            })
            .await
    }

    async fn handle_log_entry(
        &self,
        sequence: u64,
        operation: Operation,
    ) -> Result<(), ReplError> {
        let peer_id = self.ready_peer().await?;

        let holds_lock = { *self.replica_in_transaction.lock().await == Some(peer_id) };
        if !holds_lock {
            tracing::warn!(replica_id = peer_id, "log entry from out-of-turn writer");
            return self
                .session
                .send(ReplicationMessage::LogEntryAck {
                    sequence,
                    response_code: ResponseCode::NotOk,
                })
                .await;
        }

        match operation.execute(self.partition.as_ref(), &self.store).await {
            Ok(()) => {
                self.session
                    .send(ReplicationMessage::LogEntryAck {
                        sequence,
                        response_code: ResponseCode::Ok,
                    })
                    .await
            }
            Err(e) => {
                // An apply failure is not absorbed: acknowledge the failure,
                // then let it tear the connection down.
                tracing::error!(
                    csn = %operation.csn(),
                    dn = %operation.dn(),
                    error = %e,
                    "failed to apply replicated operation"
                );
                self.session
                    .send(ReplicationMessage::LogEntryAck {
                        sequence,
                        response_code: ResponseCode::NotOk,
                    })
                    .await?;
                Err(e)
            }
        }
    }

    async fn handle_end(&self, sequence: u64) -> Result<(), ReplError> {
        let peer_id = self.ready_peer().await?;

        let mut txn = self.replica_in_transaction.lock().await;
        let response_code = if *txn == Some(peer_id) {
            *txn = None;
            ResponseCode::Ok
        } else {
            ResponseCode::NotOk
        };
        tracing::debug!(replica_id = peer_id, ?response_code, "round ended");
        self.session
            .send(ReplicationMessage::EndLogEntriesAck {
                sequence,
                response_code,
            })
            .await
    }

    /// The authenticated peer's id, or a protocol error while `Init`.
    async fn ready_peer(&self) -> Result<ReplicaId, ReplError> {
        let ctx = self.context.lock().await;
        match (&ctx.state, &ctx.peer) {
            (ContextState::Ready, Some(peer)) => Ok(peer.id),
            _ => Err(ReplError::Protocol {
                msg: "replication message before login".into(),
            }),
        }
    }
}
