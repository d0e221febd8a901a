//! In-process datagram link.
//!
//! [`MemoryTransport::pair`] returns two connected endpoints that exchange
//! datagrams through unbounded tokio channels.  The link itself is perfect
//! (no loss, no reordering); wrap each end in a
//! [`crate::simulator::ImpairedChannel`] to make it lossy.
//!
//! Semantics follow UDP where it matters to the engines:
//! - sending to a peer that has gone away silently drops the datagram;
//! - datagrams addressed elsewhere than the peer vanish;
//! - closing an endpoint releases any pending receive with
//!   [`TransportError::Closed`].
//!
//! Unlike UDP, a receive on an endpoint whose peer was dropped (and whose
//! queue is drained) reports [`TransportError::Disconnected`] instead of
//! waiting out the timeout.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::TransportError;
use crate::socket::Transport;

type Datagram = (Vec<u8>, SocketAddr);

// Ports handed to successive pairs so addresses stay distinct within a process.
static NEXT_PORT: AtomicU16 = AtomicU16::new(40_000);

/// One end of an in-process datagram link.
#[derive(Debug)]
pub struct MemoryTransport {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
    rx: Mutex<mpsc::UnboundedReceiver<Datagram>>,
    closed: watch::Sender<bool>,
}

impl MemoryTransport {
    /// Create two endpoints wired to each other.
    pub fn pair() -> (Self, Self) {
        let port_a = NEXT_PORT.fetch_add(2, Ordering::Relaxed);
        let a_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port_a));
        let b_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port_a.wrapping_add(1)));

        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = Self {
            local_addr: a_addr,
            peer_addr: b_addr,
            tx: a_tx,
            rx: Mutex::new(a_rx),
            closed: watch::Sender::new(false),
        };
        let b = Self {
            local_addr: b_addr,
            peer_addr: a_addr,
            tx: b_tx,
            rx: Mutex::new(b_rx),
            closed: watch::Sender::new(false),
        };
        (a, b)
    }

    /// Address of the other end of the link.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        if dest != self.peer_addr {
            log::trace!("[mem] {} → {dest}: no such endpoint, dropped", self.local_addr);
            return Ok(());
        }
        if self.tx.send((buf.to_vec(), self.local_addr)).is_err() {
            log::trace!("[mem] {} → {dest}: peer gone, dropped", self.local_addr);
        }
        Ok(())
    }

    async fn recv_from(
        &self,
        wait: Duration,
    ) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let recv = async {
            let mut rx = self.rx.lock().await;
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(datagram)) => Ok(Some(datagram)),
                Ok(None) => Err(TransportError::Disconnected),
                Err(_elapsed) => Ok(None),
            }
        };

        tokio::select! {
            _ = closed.wait_for(|c| *c) => Err(TransportError::Closed),
            res = recv => res,
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}
