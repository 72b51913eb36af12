//! Initiator side of the replication protocol.
//!
//! The client logs in. On an idle tick, once the previous round has fully
//! drained, it starts a replication round: it asks the peer for its
//! vectors, decides between full transfer and incremental shipping, streams
//! log entries, and always ends the round so the peer's write lock is
//! released.
//!
//! Any error returned from these handlers means the connection is no longer
//! usable; the dispatch layer closes it. There is no partial-round resume.

use crate::config::ReplicationConfig;
use crate::context::{ContextState, ReplicationContext};
use crate::error::ReplError;
use crate::message::{ReplicationMessage, ResponseCode};
use crate::op::Operation;
use crate::partition::Partition;
use crate::session::ReplicationSession;
use crate::store::ReplicationStore;
use oxidir_model::CsnVector;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Drives one outbound replication connection.
pub struct ClientHandler {
    config: Arc<ReplicationConfig>,
    store: ReplicationStore,
    partition: Arc<dyn Partition>,
    session: Arc<dyn ReplicationSession>,
    context: Mutex<ReplicationContext>,
}

impl ClientHandler {
    /// Create a handler for a freshly opened outbound connection.
    pub fn new(
        config: Arc<ReplicationConfig>,
        store: ReplicationStore,
        partition: Arc<dyn Partition>,
        session: Arc<dyn ReplicationSession>,
    ) -> Self {
        Self {
            config,
            store,
            partition,
            session,
            context: Mutex::new(ReplicationContext::new()),
        }
    }

    /// Current protocol state (for dispatch-layer introspection and tests).
    pub async fn state(&self) -> ContextState {
        self.context.lock().await.state
    }

    /// Send a request, allocating its sequence and scheduling its response
    /// expiration.
    async fn send_request(
        &self,
        build: impl FnOnce(u64) -> ReplicationMessage,
    ) -> Result<(), ReplError> {
        let mut ctx = self.context.lock().await;
        let sequence = ctx.next_sequence();
        ctx.expect_response(sequence, Instant::now() + self.config.response_timeout());
        let msg = build(sequence);
        tracing::debug!(kind = msg.kind(), sequence, "sending");
        self.session.send(msg).await
    }

    /// Connection opened: identify ourselves.
    pub async fn on_connect(&self) -> Result<(), ReplError> {
        let replica_id = self.config.replica_id;
        self.send_request(|sequence| ReplicationMessage::Login {
            sequence,
            replica_id,
        })
        .await
    }

    /// Idle tick. Closes the connection on an overdue response; otherwise
    /// starts a replication round when the triple guard holds: logged in,
    /// nothing awaiting acknowledgement, nothing queued outbound. The guard
    /// keeps at most one round in flight per connection.
    pub async fn on_idle(&self, now: Instant) -> Result<(), ReplError> {
        {
            let ctx = self.context.lock().await;
            if let Some(sequence) = ctx.overdue(now) {
                tracing::warn!(sequence, "response overdue, abandoning connection");
                return Err(ReplError::ResponseTimeout { sequence });
            }
            if ctx.state != ContextState::Ready
                || ctx.has_pending()
                || self.session.scheduled_send_count() > 0
            {
                return Ok(());
            }
        }
        self.send_request(|sequence| ReplicationMessage::BeginLogEntries { sequence })
            .await
    }

    /// Handle one inbound message.
    pub async fn on_message(&self, msg: ReplicationMessage) -> Result<(), ReplError> {
        match msg {
            ReplicationMessage::LoginAck {
                sequence,
                response_code,
                replica_id,
            } => self.handle_login_ack(sequence, response_code, replica_id).await,
            ReplicationMessage::BeginLogEntriesAck {
                sequence,
                response_code,
                update_vector,
                ..
            } => {
                self.handle_begin_ack(sequence, response_code, update_vector)
                    .await
            }
            ReplicationMessage::LogEntryAck {
                sequence,
                response_code,
            } => {
                self.acknowledge(sequence).await?;
                if response_code != ResponseCode::Ok {
                    tracing::warn!(sequence, "peer failed to apply log entry");
                    return Err(ReplError::Protocol {
                        msg: format!("log entry {sequence} rejected by peer"),
                    });
                }
                Ok(())
            }
            ReplicationMessage::EndLogEntriesAck {
                sequence,
                response_code,
            } => {
                self.acknowledge(sequence).await?;
                if response_code != ResponseCode::Ok {
                    // The peer claims we did not hold its lock; the round is
                    // over either way, the next idle tick decides what to do.
                    tracing::warn!(sequence, "end of round not acknowledged cleanly");
                }
                Ok(())
            }
            other => {
                tracing::warn!(kind = other.kind(), "message not valid for initiator role");
                Err(ReplError::Protocol {
                    msg: format!("unexpected {} on client connection", other.kind()),
                })
            }
        }
    }

    /// Connection closed: drop all pending expirations.
    pub async fn on_close(&self) {
        let mut ctx = self.context.lock().await;
        *ctx = ReplicationContext::new();
    }

    async fn acknowledge(&self, sequence: u64) -> Result<(), ReplError> {
        let mut ctx = self.context.lock().await;
        if !ctx.acknowledge(sequence) {
            return Err(ReplError::Protocol {
                msg: format!("acknowledgement for unknown sequence {sequence}"),
            });
        }
        Ok(())
    }

    async fn handle_login_ack(
        &self,
        sequence: u64,
        response_code: ResponseCode,
        replica_id: u64,
    ) -> Result<(), ReplError> {
        let mut ctx = self.context.lock().await;
        if ctx.state != ContextState::Init || !ctx.acknowledge(sequence) {
            return Err(ReplError::Protocol {
                msg: "unexpected LoginAck".into(),
            });
        }
        if response_code != ResponseCode::Ok {
            tracing::warn!(replica_id, "peer refused login");
            return Err(ReplError::Protocol {
                msg: format!("login refused by replica {replica_id}"),
            });
        }

        // Never trust the claimed id alone: the peer must be configured and
        // must be talking from its configured address.
        let peer = self
            .config
            .peer(replica_id)
            .ok_or(ReplError::UnknownReplica { replica_id })?;
        let actual = self.session.remote_addr();
        if peer.address != actual {
            return Err(ReplError::AddressMismatch {
                replica_id,
                expected: peer.address,
                actual,
            });
        }

        tracing::info!(replica_id, address = %peer.address, "logged in to peer");
        ctx.peer = Some(peer);
        ctx.state = ContextState::Ready;
        Ok(())
    }

    async fn handle_begin_ack(
        &self,
        sequence: u64,
        response_code: ResponseCode,
        update_vector: Option<CsnVector>,
    ) -> Result<(), ReplError> {
        {
            let ctx = self.context.lock().await;
            if ctx.state != ContextState::Ready {
                return Err(ReplError::Protocol {
                    msg: "BeginLogEntriesAck before login".into(),
                });
            }
        }
        self.acknowledge(sequence).await?;

        if response_code != ResponseCode::Ok {
            // Another peer's round is active on the responder; the next idle
            // tick retries.
            tracing::debug!("peer busy, round refused");
            return Ok(());
        }
        let your_uv = update_vector.ok_or_else(|| ReplError::Protocol {
            msg: "granted round without an update vector".into(),
        })?;

        // The peer's write lock is held from here on: whatever happens while
        // shipping, the round must end so the lock is released.
        let outcome = self.ship(&your_uv).await;
        let ended = self
            .send_request(|sequence| ReplicationMessage::EndLogEntries { sequence })
            .await;
        outcome.and(ended)
    }

    /// Decide between full transfer and incremental shipping, then stream.
    async fn ship(&self, your_uv: &CsnVector) -> Result<(), ReplError> {
        let my_pv = self.store.purge_vector().await;

        if !my_pv.is_empty() && your_uv.is_empty() {
            tracing::info!("peer has no history, starting full transfer");
            return self.ship_everything().await;
        }
        self.ship_replication_logs(&my_pv, your_uv).await
    }

    /// Full transfer: every entry under every naming context, as a synthetic
    /// Add tagged with the entry's own CSN. Fire-and-continue.
    async fn ship_everything(&self) -> Result<(), ReplError> {
        let mut sent = 0usize;
        for context in self.partition.naming_contexts().await {
            let mut cursor = self.partition.search_subtree(&context).await?;
            while let Some(entry) = cursor.next().await {
                let operation = Operation::Add {
                    csn: entry.csn,
                    entry,
                };
                self.send_request(|sequence| ReplicationMessage::LogEntry {
                    sequence,
                    operation,
                })
                .await?;
                sent += 1;
            }
            cursor.close();
        }
        tracing::info!(sent, "full transfer streamed");
        Ok(())
    }

    /// Incremental shipping: refuse when the peer's knowledge has fallen
    /// behind the local purge watermark (the gap is unservable from the
    /// log; the connection is closed rather than silently resynced, see
    /// the retention docs), otherwise stream everything newer than the
    /// peer's update vector in CSN order.
    async fn ship_replication_logs(
        &self,
        my_pv: &CsnVector,
        your_uv: &CsnVector,
    ) -> Result<(), ReplError> {
        for (replica_id, my_csn) in my_pv.iter() {
            match your_uv.get(replica_id) {
                Some(yours) if yours >= my_csn => {}
                yours => {
                    tracing::warn!(
                        replica_id,
                        peer_csn = yours.map(|c| c.to_string()).unwrap_or_default(),
                        watermark = %my_csn,
                        "peer is behind the purge watermark, cannot ship incrementally"
                    );
                    return Err(ReplError::Protocol {
                        msg: format!("peer behind purge watermark for replica {replica_id}"),
                    });
                }
            }
        }

        let mut cursor = self.store.iterate(your_uv, false).await;
        let mut sent = 0usize;
        let outcome = loop {
            let Some(operation) = cursor.next().await else {
                break Ok(());
            };
            if let Err(e) = self
                .send_request(|sequence| ReplicationMessage::LogEntry {
                    sequence,
                    operation,
                })
                .await
            {
                break Err(e);
            }
            sent += 1;
        };
        cursor.close();
        tracing::debug!(sent, "incremental shipping done");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use crate::op::Operation;
    use crate::partition::MemoryPartition;
    use crate::session::ChannelSession;
    use oxidir_model::{Csn, Dn, Entry};
    use std::net::SocketAddr;
    use std::time::Duration;

    const LOCAL_ID: u64 = 1;
    const PEER_ID: u64 = 2;

    fn local_addr() -> SocketAddr {
        "10.0.0.1:10389".parse().unwrap()
    }

    fn peer_addr() -> SocketAddr {
        "10.0.0.2:10389".parse().unwrap()
    }

    fn config() -> Arc<ReplicationConfig> {
        Arc::new(ReplicationConfig {
            replica_id: LOCAL_ID,
            peers: vec![PeerConfig {
                replica_id: PEER_ID,
                address: peer_addr(),
            }],
            ..Default::default()
        })
    }

    struct Fixture {
        handler: ClientHandler,
        peer_end: ChannelSession,
        store: ReplicationStore,
        partition: Arc<MemoryPartition>,
    }

    fn fixture() -> Fixture {
        let (ours, peer_end) = ChannelSession::pair(local_addr(), peer_addr());
        let store = ReplicationStore::new(LOCAL_ID);
        let partition = Arc::new(MemoryPartition::new(vec![Dn::new("dc=example")]));
        let handler = ClientHandler::new(
            config(),
            store.clone(),
            partition.clone(),
            Arc::new(ours),
        );
        Fixture {
            handler,
            peer_end,
            store,
            partition,
        }
    }

    fn add_op(ts: u64, seq: u32, dn: &str) -> Operation {
        let csn = Csn::new(ts, LOCAL_ID, seq);
        Operation::Add {
            csn,
            entry: Entry::new(Dn::new(dn), csn),
        }
    }

    async fn login(fx: &Fixture) {
        fx.handler.on_connect().await.unwrap();
        let login = fx.peer_end.recv().await.unwrap();
        assert!(matches!(login, ReplicationMessage::Login { replica_id, .. } if replica_id == LOCAL_ID));
        fx.handler
            .on_message(ReplicationMessage::LoginAck {
                sequence: login.sequence(),
                response_code: ResponseCode::Ok,
                replica_id: PEER_ID,
            })
            .await
            .unwrap();
        assert_eq!(fx.handler.state().await, ContextState::Ready);
    }

    /// Drain everything the client queued, answering nothing.
    async fn drain_peer(fx: &Fixture) -> Vec<ReplicationMessage> {
        let mut out = Vec::new();
        while let Some(msg) = fx.peer_end.try_recv().await {
            out.push(msg);
        }
        out
    }

    mod login_flow {
        use super::*;

        #[tokio::test]
        async fn test_login_then_ready() {
            let fx = fixture();
            login(&fx).await;
        }

        #[tokio::test]
        async fn test_refused_login_is_fatal() {
            let fx = fixture();
            fx.handler.on_connect().await.unwrap();
            let seq = fx.peer_end.recv().await.unwrap().sequence();
            let err = fx
                .handler
                .on_message(ReplicationMessage::LoginAck {
                    sequence: seq,
                    response_code: ResponseCode::NotOk,
                    replica_id: PEER_ID,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::Protocol { .. }));
        }

        #[tokio::test]
        async fn test_unknown_replica_id_is_fatal() {
            let fx = fixture();
            fx.handler.on_connect().await.unwrap();
            let seq = fx.peer_end.recv().await.unwrap().sequence();
            let err = fx
                .handler
                .on_message(ReplicationMessage::LoginAck {
                    sequence: seq,
                    response_code: ResponseCode::Ok,
                    replica_id: 99,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::UnknownReplica { replica_id: 99 }));
        }

        #[tokio::test]
        async fn test_address_mismatch_is_fatal() {
            // Peer 2 is configured at peer_addr(), but this session's remote
            // is somewhere else entirely.
            let (ours, peer_end) =
                ChannelSession::pair(local_addr(), "10.9.9.9:10389".parse().unwrap());
            let handler = ClientHandler::new(
                config(),
                ReplicationStore::new(LOCAL_ID),
                Arc::new(MemoryPartition::new(vec![])),
                Arc::new(ours),
            );
            handler.on_connect().await.unwrap();
            let seq = peer_end.recv().await.unwrap().sequence();
            let err = handler
                .on_message(ReplicationMessage::LoginAck {
                    sequence: seq,
                    response_code: ResponseCode::Ok,
                    replica_id: PEER_ID,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::AddressMismatch { .. }));
        }

        #[tokio::test]
        async fn test_ack_with_unknown_sequence_is_fatal() {
            let fx = fixture();
            fx.handler.on_connect().await.unwrap();
            let _ = fx.peer_end.recv().await.unwrap();
            let err = fx
                .handler
                .on_message(ReplicationMessage::LoginAck {
                    sequence: 777,
                    response_code: ResponseCode::Ok,
                    replica_id: PEER_ID,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::Protocol { .. }));
        }
    }

    mod idle_guard {
        use super::*;

        #[tokio::test]
        async fn test_no_round_before_ready() {
            let fx = fixture();
            fx.handler.on_idle(Instant::now()).await.unwrap();
            assert!(drain_peer(&fx).await.is_empty());
        }

        #[tokio::test]
        async fn test_no_round_while_awaiting_ack() {
            let fx = fixture();
            login(&fx).await;
            fx.handler.on_idle(Instant::now()).await.unwrap();
            assert_eq!(drain_peer(&fx).await.len(), 1); // the BeginLogEntries

            // Begin is outstanding: another idle tick must not start a
            // second round.
            fx.handler.on_idle(Instant::now()).await.unwrap();
            assert!(drain_peer(&fx).await.is_empty());
        }

        #[tokio::test]
        async fn test_no_round_with_queued_sends() {
            let fx = fixture();
            login(&fx).await;
            fx.handler.on_idle(Instant::now()).await.unwrap();
            // The BeginLogEntries is still queued (not drained): the guard on
            // scheduled sends also holds.
            fx.handler.on_idle(Instant::now()).await.unwrap();
            assert_eq!(drain_peer(&fx).await.len(), 1);
        }

        #[tokio::test]
        async fn test_overdue_response_closes() {
            let fx = fixture();
            fx.handler.on_connect().await.unwrap();
            let later = Instant::now() + Duration::from_secs(3600);
            let err = fx.handler.on_idle(later).await.unwrap_err();
            assert!(matches!(err, ReplError::ResponseTimeout { .. }));
        }
    }

    mod rounds {
        use super::*;

        async fn begin_round(fx: &Fixture) -> u64 {
            fx.handler.on_idle(Instant::now()).await.unwrap();
            let begin = fx.peer_end.recv().await.unwrap();
            assert!(matches!(begin, ReplicationMessage::BeginLogEntries { .. }));
            begin.sequence()
        }

        #[tokio::test]
        async fn test_busy_peer_means_retry_later() {
            let fx = fixture();
            login(&fx).await;
            let seq = begin_round(&fx).await;
            fx.handler
                .on_message(ReplicationMessage::BeginLogEntriesAck {
                    sequence: seq,
                    response_code: ResponseCode::NotOk,
                    purge_vector: None,
                    update_vector: None,
                })
                .await
                .unwrap();
            // Nothing shipped, no EndLogEntries; the next tick can retry.
            assert!(drain_peer(&fx).await.is_empty());
            fx.handler.on_idle(Instant::now()).await.unwrap();
            assert_eq!(drain_peer(&fx).await.len(), 1);
        }

        #[tokio::test]
        async fn test_full_transfer_when_peer_has_no_history() {
            let fx = fixture();
            // Local history: two entries, committed and logged.
            for (ts, dn) in [(10, "dc=example"), (20, "cn=a,dc=example")] {
                add_op(ts, 0, dn)
                    .execute(fx.partition.as_ref(), &fx.store)
                    .await
                    .unwrap();
            }
            login(&fx).await;
            let seq = begin_round(&fx).await;
            fx.handler
                .on_message(ReplicationMessage::BeginLogEntriesAck {
                    sequence: seq,
                    response_code: ResponseCode::Ok,
                    purge_vector: Some(CsnVector::new()),
                    update_vector: Some(CsnVector::new()),
                })
                .await
                .unwrap();

            let sent = drain_peer(&fx).await;
            assert_eq!(sent.len(), 3);
            for msg in &sent[..2] {
                assert!(
                    matches!(msg, ReplicationMessage::LogEntry { operation: Operation::Add { .. }, .. }),
                    "expected synthetic Add, got {}",
                    msg.kind()
                );
            }
            assert!(matches!(sent[2], ReplicationMessage::EndLogEntries { .. }));
        }

        #[tokio::test]
        async fn test_incremental_ships_only_newer_entries() {
            let fx = fixture();
            for (ts, dn) in [(10, "dc=example"), (20, "cn=a,dc=example"), (30, "cn=b,dc=example")] {
                add_op(ts, 0, dn)
                    .execute(fx.partition.as_ref(), &fx.store)
                    .await
                    .unwrap();
            }
            login(&fx).await;
            let seq = begin_round(&fx).await;

            // Peer already has everything up to ts=20.
            let your_uv = CsnVector::from_entries([Csn::new(20, LOCAL_ID, 0)]);
            fx.handler
                .on_message(ReplicationMessage::BeginLogEntriesAck {
                    sequence: seq,
                    response_code: ResponseCode::Ok,
                    purge_vector: Some(CsnVector::new()),
                    update_vector: Some(your_uv),
                })
                .await
                .unwrap();

            let sent = drain_peer(&fx).await;
            assert_eq!(sent.len(), 2);
            match &sent[0] {
                ReplicationMessage::LogEntry { operation, .. } => {
                    assert_eq!(*operation.csn(), Csn::new(30, LOCAL_ID, 0));
                }
                other => panic!("expected LogEntry, got {}", other.kind()),
            }
            assert!(matches!(sent[1], ReplicationMessage::EndLogEntries { .. }));
            assert_eq!(fx.store.open_cursors(), 0);
        }

        #[tokio::test]
        async fn test_peer_behind_watermark_closes_but_ends_round() {
            let fx = fixture();
            for ts in [10, 20, 30] {
                add_op(ts, 0, &format!("cn=t{ts},dc=example"))
                    .execute(fx.partition.as_ref(), &fx.store)
                    .await
                    .unwrap();
            }
            // Retention drops ts=10; the purge watermark moves to ts=20.
            fx.store
                .purge_older_than(Duration::from_millis(15), 30)
                .await;
            login(&fx).await;
            let seq = begin_round(&fx).await;

            // Peer has history (not empty), but only up to ts=10.
            let your_uv = CsnVector::from_entries([Csn::new(10, LOCAL_ID, 0)]);
            let err = fx
                .handler
                .on_message(ReplicationMessage::BeginLogEntriesAck {
                    sequence: seq,
                    response_code: ResponseCode::Ok,
                    purge_vector: Some(CsnVector::new()),
                    update_vector: Some(your_uv),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::Protocol { .. }));

            // No LogEntry went out, but the round was still ended so the
            // peer's write lock is released.
            let sent = drain_peer(&fx).await;
            assert_eq!(sent.len(), 1);
            assert!(matches!(sent[0], ReplicationMessage::EndLogEntries { .. }));
        }

        #[tokio::test]
        async fn test_log_entry_rejection_is_fatal() {
            let fx = fixture();
            add_op(10, 0, "dc=example")
                .execute(fx.partition.as_ref(), &fx.store)
                .await
                .unwrap();
            login(&fx).await;
            let seq = begin_round(&fx).await;
            fx.handler
                .on_message(ReplicationMessage::BeginLogEntriesAck {
                    sequence: seq,
                    response_code: ResponseCode::Ok,
                    purge_vector: Some(CsnVector::new()),
                    update_vector: Some(CsnVector::from_entries([Csn::new(5, LOCAL_ID, 0)])),
                })
                .await
                .unwrap();
            let sent = drain_peer(&fx).await;
            let entry_seq = sent
                .iter()
                .find_map(|m| match m {
                    ReplicationMessage::LogEntry { sequence, .. } => Some(*sequence),
                    _ => None,
                })
                .unwrap();

            let err = fx
                .handler
                .on_message(ReplicationMessage::LogEntryAck {
                    sequence: entry_seq,
                    response_code: ResponseCode::NotOk,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::Protocol { .. }));
        }

        #[tokio::test]
        async fn test_round_completes_after_all_acks() {
            let fx = fixture();
            add_op(10, 0, "dc=example")
                .execute(fx.partition.as_ref(), &fx.store)
                .await
                .unwrap();
            login(&fx).await;
            let seq = begin_round(&fx).await;
            fx.handler
                .on_message(ReplicationMessage::BeginLogEntriesAck {
                    sequence: seq,
                    response_code: ResponseCode::Ok,
                    purge_vector: Some(CsnVector::new()),
                    update_vector: Some(CsnVector::from_entries([Csn::new(5, LOCAL_ID, 0)])),
                })
                .await
                .unwrap();

            for msg in drain_peer(&fx).await {
                match msg {
                    ReplicationMessage::LogEntry { sequence, .. } => fx
                        .handler
                        .on_message(ReplicationMessage::LogEntryAck {
                            sequence,
                            response_code: ResponseCode::Ok,
                        })
                        .await
                        .unwrap(),
                    ReplicationMessage::EndLogEntries { sequence } => fx
                        .handler
                        .on_message(ReplicationMessage::EndLogEntriesAck {
                            sequence,
                            response_code: ResponseCode::Ok,
                        })
                        .await
                        .unwrap(),
                    other => panic!("unexpected {}", other.kind()),
                }
            }

            // Everything acknowledged: the next tick may start a new round.
            fx.handler.on_idle(Instant::now()).await.unwrap();
            assert_eq!(drain_peer(&fx).await.len(), 1);
        }
    }

    mod protocol_violations {
        use super::*;

        #[tokio::test]
        async fn test_request_messages_are_invalid_for_client() {
            let fx = fixture();
            login(&fx).await;
            let err = fx
                .handler
                .on_message(ReplicationMessage::BeginLogEntries { sequence: 0 })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::Protocol { .. }));
        }

        #[tokio::test]
        async fn test_begin_ack_before_login_is_invalid() {
            let fx = fixture();
            let err = fx
                .handler
                .on_message(ReplicationMessage::BeginLogEntriesAck {
                    sequence: 0,
                    response_code: ResponseCode::Ok,
                    purge_vector: None,
                    update_vector: None,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ReplError::Protocol { .. }));
        }
    }
}
