//! In-process multi-replica test harness.
//!
//! Replicas are full [`ReplicationService`] instances wired together over
//! [`ChannelSession`] pairs. The harness pumps queued messages between the
//! two services until the link is quiescent, recording everything it
//! ferried, so scenario tests can assert on the wire conversation as well
//! as on the resulting stores and partitions.

use oxidir_model::{Csn, CsnFactory, Dn, Entry, ReplicaId};
use oxidir_repl::{
    ChannelSession, ConnId, MemoryPartition, Operation, Partition, PeerConfig, PeerRole,
    ReplicationConfig, ReplicationMessage, ReplicationService, ReplicationSession,
    ReplicationStore,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

fn addr_for(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().expect("valid address")
}

/// One replica under test: a service over an in-memory partition and store,
/// with its own CSN factory and a controllable clock.
pub struct TestReplica {
    /// The replica's id.
    pub replica_id: ReplicaId,
    /// The replica's advertised address.
    pub addr: SocketAddr,
    /// The directory partition the replica serves.
    pub partition: Arc<MemoryPartition>,
    /// The replication service under test.
    pub service: Arc<ReplicationService>,
    factory: Mutex<CsnFactory>,
    clock_ms: AtomicU64,
}

impl TestReplica {
    /// Build a replica listening (notionally) on `7000 + replica_id`, with
    /// every other id in `peer_ids` configured the same way.
    pub fn new(replica_id: ReplicaId, peer_ids: &[ReplicaId]) -> Self {
        oxidir_repl::telemetry::init();
        let config = Arc::new(ReplicationConfig {
            replica_id,
            peers: peer_ids
                .iter()
                .filter(|id| **id != replica_id)
                .map(|id| PeerConfig {
                    replica_id: *id,
                    address: addr_for(7000 + *id as u16),
                })
                .collect(),
            ..Default::default()
        });
        let partition = Arc::new(MemoryPartition::new(vec![Dn::new("dc=example")]));
        let store = ReplicationStore::new(replica_id);
        let service = Arc::new(ReplicationService::new(
            config,
            store,
            Arc::clone(&partition) as Arc<dyn Partition>,
        ));
        Self {
            replica_id,
            addr: addr_for(7000 + replica_id as u16),
            partition,
            service,
            factory: Mutex::new(CsnFactory::new(replica_id)),
            clock_ms: AtomicU64::new(1_000),
        }
    }

    /// The replica's current test clock, in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.clock_ms.load(Ordering::SeqCst)
    }

    /// Advance the test clock.
    pub fn advance_clock(&self, ms: u64) {
        self.clock_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// The replica's replication store.
    pub fn store(&self) -> &ReplicationStore {
        self.service.store()
    }

    /// Commit a local Add: apply it to the partition and log it, exactly as
    /// a write accepted from a directory client would be.
    pub async fn commit(&self, dn: &str) -> anyhow::Result<Csn> {
        self.advance_clock(1);
        let csn = self.factory.lock().await.issue(self.now_ms());
        let entry = Entry::new(Dn::new(dn), csn)
            .with_attribute("objectclass", vec!["top".to_string()]);
        let op = Operation::Add { csn, entry };
        op.execute(self.partition.as_ref(), self.store()).await?;
        Ok(csn)
    }

    /// Commit a local Delete of an existing entry.
    pub async fn commit_delete(&self, dn: &str) -> anyhow::Result<Csn> {
        self.advance_clock(1);
        let csn = self.factory.lock().await.issue(self.now_ms());
        let op = Operation::Delete {
            csn,
            dn: Dn::new(dn),
        };
        op.execute(self.partition.as_ref(), self.store()).await?;
        Ok(csn)
    }

    /// Run the retention pass against the current test clock.
    pub async fn purge(&self) -> usize {
        self.service.purge(self.now_ms()).await
    }
}

/// A live bidirectional link: `a` drives rounds as the initiator, `b`
/// responds.
pub struct TestLink {
    /// `a`'s connection id for the link.
    pub a_conn: ConnId,
    /// `b`'s connection id for the link.
    pub b_conn: ConnId,
    a_end: Arc<ChannelSession>,
    b_end: Arc<ChannelSession>,
}

/// Every message the pump ferried across a link, in delivery order.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Messages the initiator sent to the responder.
    pub a_to_b: Vec<ReplicationMessage>,
    /// Messages the responder sent back.
    pub b_to_a: Vec<ReplicationMessage>,
    /// Handler errors observed while dispatching (each closed a connection).
    pub errors: Vec<String>,
}

impl Transcript {
    /// Kinds of the initiator-to-responder messages, for shape assertions.
    pub fn a_to_b_kinds(&self) -> Vec<&'static str> {
        self.a_to_b.iter().map(|m| m.kind()).collect()
    }

    /// Append another transcript's messages and errors to this one.
    pub fn extend(&mut self, other: Transcript) {
        self.a_to_b.extend(other.a_to_b);
        self.b_to_a.extend(other.b_to_a);
        self.errors.extend(other.errors);
    }

    /// The CSNs of shipped log entries, in delivery order.
    pub fn shipped_csns(&self) -> Vec<Csn> {
        self.a_to_b
            .iter()
            .filter_map(|m| match m {
                ReplicationMessage::LogEntry { operation, .. } => Some(*operation.csn()),
                _ => None,
            })
            .collect()
    }
}

impl TestLink {
    /// Wire `a` to `b`: `b` accepts the connection, `a` dials out and logs
    /// in. The Login is queued but not yet delivered; call [`TestLink::pump`].
    pub async fn connect(a: &TestReplica, b: &TestReplica) -> anyhow::Result<TestLink> {
        let (a_end, b_end) = ChannelSession::pair(a.addr, b.addr);
        let a_end = Arc::new(a_end);
        let b_end = Arc::new(b_end);
        let b_conn = b
            .service
            .connection_opened(
                Arc::clone(&b_end) as Arc<dyn ReplicationSession>,
                PeerRole::Server,
            )
            .await?;
        let a_conn = a
            .service
            .connection_opened(
                Arc::clone(&a_end) as Arc<dyn ReplicationSession>,
                PeerRole::Client,
            )
            .await?;
        Ok(TestLink {
            a_conn,
            b_conn,
            a_end,
            b_end,
        })
    }

    /// Ferry queued messages in both directions until neither side has
    /// anything left to say. Dispatch errors are recorded, not raised: the
    /// protocol's recovery action for a handler error is closing the
    /// connection, and several scenarios assert exactly that.
    pub async fn pump(&self, a: &TestReplica, b: &TestReplica) -> Transcript {
        let mut transcript = Transcript::default();
        loop {
            let mut progressed = false;

            if let Some(msg) = self.b_end.try_recv().await {
                tracing::trace!(kind = msg.kind(), "ferrying to responder");
                transcript.a_to_b.push(msg.clone());
                if let Err(e) = b.service.message_received(self.b_conn, msg).await {
                    transcript.errors.push(e.to_string());
                }
                progressed = true;
            }
            if let Some(msg) = self.a_end.try_recv().await {
                tracing::trace!(kind = msg.kind(), "ferrying to initiator");
                transcript.b_to_a.push(msg.clone());
                if let Err(e) = a.service.message_received(self.a_conn, msg).await {
                    transcript.errors.push(e.to_string());
                }
                progressed = true;
            }

            if !progressed {
                return transcript;
            }
        }
    }

    /// One replication round: flush anything already queued (the login
    /// exchange, on a fresh link), tick the initiator so it starts a round
    /// when eligible, then pump to quiescence.
    pub async fn replicate(&self, a: &TestReplica, b: &TestReplica) -> Transcript {
        let mut transcript = self.pump(a, b).await;
        a.service.tick(Instant::now()).await;
        transcript.extend(self.pump(a, b).await);
        transcript
    }

    /// True while both services still track the link.
    pub fn is_open(&self, a: &TestReplica, b: &TestReplica) -> bool {
        a.service.is_open(self.a_conn) && b.service.is_open(self.b_conn)
    }
}

/// A hand-scripted peer on a server connection: the test plays the remote
/// replica, sending raw protocol messages and reading the acks.
pub struct ScriptedPeer {
    /// The responder's connection id for this peer.
    pub conn: ConnId,
    end: Arc<ChannelSession>,
}

impl ScriptedPeer {
    /// Attach to `server` from the address `replica_id` is configured at,
    /// without logging in.
    pub async fn attach(server: &TestReplica, replica_id: ReplicaId) -> anyhow::Result<ScriptedPeer> {
        let (server_end, end) =
            ChannelSession::pair(server.addr, addr_for(7000 + replica_id as u16));
        let conn = server
            .service
            .connection_opened(
                Arc::new(server_end) as Arc<dyn ReplicationSession>,
                PeerRole::Server,
            )
            .await?;
        Ok(ScriptedPeer {
            conn,
            end: Arc::new(end),
        })
    }

    /// Attach and log in as `replica_id`.
    pub async fn login(server: &TestReplica, replica_id: ReplicaId) -> anyhow::Result<ScriptedPeer> {
        let peer = Self::attach(server, replica_id).await?;
        peer.send(
            server,
            ReplicationMessage::Login {
                sequence: 0,
                replica_id,
            },
        )
        .await?;
        let ack = peer.recv().await;
        anyhow::ensure!(
            matches!(
                ack,
                Some(ReplicationMessage::LoginAck { response_code, .. })
                    if response_code == oxidir_repl::ResponseCode::Ok
            ),
            "login was not acknowledged"
        );
        Ok(peer)
    }

    /// Deliver one message to the responder. A handler error is returned to
    /// the caller; the service has already closed the connection.
    pub async fn send(
        &self,
        server: &TestReplica,
        msg: ReplicationMessage,
    ) -> anyhow::Result<()> {
        server.service.message_received(self.conn, msg).await?;
        Ok(())
    }

    /// Read the next queued response, if any.
    pub async fn recv(&self) -> Option<ReplicationMessage> {
        self.end.try_recv().await
    }
}
