//! Datagram transport abstraction.
//!
//! [`Transport`] is the raw, unreliable, message-oriented channel the engines
//! run on: send one datagram to an address, receive one datagram with a
//! bounded wait.  [`UdpTransport`] is the real thing, a thin wrapper around
//! `tokio::net::UdpSocket`; [`crate::memory::MemoryTransport`] is an
//! in-process stand-in for tests.
//!
//! Transports move bytes only.  Framing and validation live in
//! [`crate::packet`], impairment in [`crate::simulator`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};

use crate::error::TransportError;

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
pub const MAX_DATAGRAM: usize = 65_535;

/// A primitive "send one message to address" / "receive one message" channel.
///
/// Delivery is best-effort: a successful `send_to` says nothing about arrival.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmit one datagram to `dest`.
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), TransportError>;

    /// Wait at most `wait` for the next datagram.
    ///
    /// `Ok(None)` means the wait elapsed.  After [`Transport::close`] every
    /// pending and future call returns [`TransportError::Closed`] promptly.
    async fn recv_from(
        &self,
        wait: Duration,
    ) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError>;

    /// Address this endpoint is reachable at.
    fn local_addr(&self) -> SocketAddr;

    /// Shut the endpoint down, releasing any receive in progress.
    fn close(&self);
}

/// Shared transports: lets a caller keep a handle to [`Transport::close`] an
/// endpoint an engine is running on.
#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        (**self).send_to(buf, dest).await
    }

    async fn recv_from(
        &self,
        wait: Duration,
    ) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError> {
        (**self).recv_from(wait).await
    }

    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }

    fn close(&self) {
        (**self).close()
    }
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// An async UDP socket speaking raw datagrams.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct UdpTransport {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    local_addr: SocketAddr,
    inner: UdpSocket,
    /// Receive buffer, allocated once and reused by every `recv_from`.
    buf: Mutex<Vec<u8>>,
    closed: watch::Sender<bool>,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        log::debug!("[udp] bound {local_addr}");
        Ok(Self {
            local_addr,
            inner,
            buf: Mutex::new(vec![0u8; MAX_DATAGRAM]),
            closed: watch::Sender::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.inner.send_to(buf, dest).await?;
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
            let mut buf = self.buf.lock().await;
            match tokio::time::timeout(wait, self.inner.recv_from(&mut buf[..])).await {
                Ok(Ok((n, addr))) => Ok(Some((buf[..n].to_vec(), addr))),
                Ok(Err(e)) => Err(TransportError::Io(e)),
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
