//! Error types surfaced by transports and transfer sessions.
//!
//! Corruption, loss, reordering and duplicates are *not* errors: the engines
//! absorb them with discard / re-ACK / retransmit.  What reaches the caller is
//! limited to an unusable transport, a rejected configuration, or a peer that
//! stopped answering altogether.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures of the underlying datagram transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// The local endpoint was closed; pending receives are released.
    #[error("transport closed")]
    Closed,
    /// The remote end of an in-process link has gone away.
    #[error("peer endpoint disconnected")]
    Disconnected,
}

/// Transfer-level abort.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `max_timeouts` consecutive retransmission timeouts without progress.
    #[error("peer unresponsive after {0} consecutive timeouts")]
    PeerUnresponsive(u32),
    /// The receiver heard nothing valid from its peer for `idle_timeout`.
    #[error("peer silent for {0:?}")]
    PeerSilent(Duration),
    #[error("sequence number space exhausted")]
    SequenceSpaceExhausted,
    #[error("delivered {delivered} bytes do not match the {sent} bytes sent")]
    DeliveryMismatch { sent: usize, delivered: usize },
}

impl TransferError {
    /// `true` when the local transport was shut down underneath the session.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TransferError::Transport(TransportError::Closed | TransportError::Disconnected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_through_transport() {
        let io = io::Error::new(io::ErrorKind::NotConnected, "gone");
        let err: TransferError = TransportError::from(io).into();
        assert!(matches!(err, TransferError::Transport(TransportError::Io(_))));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn closed_is_recognised() {
        assert!(TransferError::from(TransportError::Closed).is_closed());
        assert!(!TransferError::PeerUnresponsive(3).is_closed());
        assert!(!TransferError::PeerSilent(Duration::from_secs(1)).is_closed());
    }
}
