//! The transport session seam.
//!
//! The engine never opens sockets; it talks to an established session
//! through [`ReplicationSession`]. Sends are asynchronous and queued; the
//! protocol's wait-for-ack sequencing lives in handler state, not in
//! blocking calls. [`ChannelSession`] is the in-process implementation
//! built on paired tokio channels, used by tests and embedded deployments.

use crate::error::ReplError;
use crate::message::ReplicationMessage;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// An established, message-oriented connection to one peer.
#[async_trait]
pub trait ReplicationSession: Send + Sync {
    /// Queue a message for delivery. Returns without waiting for the peer.
    async fn send(&self, msg: ReplicationMessage) -> Result<(), ReplError>;

    /// The remote address of the connection, used to validate identity
    /// claims against the configured peer list.
    fn remote_addr(&self) -> SocketAddr;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// True once either side has closed the connection.
    fn is_closed(&self) -> bool;

    /// Number of queued-but-unsent outbound messages.
    fn scheduled_send_count(&self) -> usize;
}

/// In-process session over paired tokio channels.
#[derive(Debug)]
pub struct ChannelSession {
    remote_addr: SocketAddr,
    tx: mpsc::UnboundedSender<ReplicationMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<ReplicationMessage>>,
    outbound_depth: Arc<AtomicUsize>,
    inbound_depth: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl ChannelSession {
    /// Create two wired-together sessions. `a` sees `addr_b` as its remote
    /// and vice versa; closing either end closes both.
    pub fn pair(addr_a: SocketAddr, addr_b: SocketAddr) -> (ChannelSession, ChannelSession) {
        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();
        let depth_ab = Arc::new(AtomicUsize::new(0));
        let depth_ba = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        let a = ChannelSession {
            remote_addr: addr_b,
            tx: tx_ab,
            rx: Mutex::new(rx_ba),
            outbound_depth: Arc::clone(&depth_ab),
            inbound_depth: Arc::clone(&depth_ba),
            closed: Arc::clone(&closed),
        };
        let b = ChannelSession {
            remote_addr: addr_a,
            tx: tx_ba,
            rx: Mutex::new(rx_ab),
            outbound_depth: depth_ba,
            inbound_depth: depth_ab,
            closed,
        };
        (a, b)
    }

    /// Receive the next inbound message, or `None` when the link is closed
    /// and drained.
    pub async fn recv(&self) -> Option<ReplicationMessage> {
        let mut rx = self.rx.lock().await;
        let msg = rx.recv().await;
        if msg.is_some() {
            self.inbound_depth.fetch_sub(1, Ordering::SeqCst);
        }
        msg
    }

    /// Receive without waiting; `None` when the queue is empty.
    pub async fn try_recv(&self) -> Option<ReplicationMessage> {
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Ok(msg) => {
                self.inbound_depth.fetch_sub(1, Ordering::SeqCst);
                Some(msg)
            }
            Err(_) => None,
        }
    }
}

#[async_trait]
impl ReplicationSession for ChannelSession {
    async fn send(&self, msg: ReplicationMessage) -> Result<(), ReplError> {
        if self.is_closed() {
            return Err(ReplError::SessionClosed);
        }
        self.outbound_depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(msg).map_err(|_| {
            self.outbound_depth.fetch_sub(1, Ordering::SeqCst);
            ReplError::SessionClosed
        })?;
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn scheduled_send_count(&self) -> usize {
        self.outbound_depth.load(Ordering::SeqCst)
    }
}
