//! Observability: per-frame events and end-of-transfer statistics.
//!
//! The engines report what they do to an [`EventSink`].  Sinks are purely
//! advisory: nothing they do feeds back into protocol decisions.  The default
//! [`LogSink`] turns events into `log::debug!` lines; tests install a
//! recording sink to assert on the exact sequence of sends and ACKs.
//!
//! [`TransferStats`] is kept by the engines themselves and returned when a
//! session finishes.

use std::time::Duration;

use crate::packet::FrameType;

/// Something the sender or receiver engine just did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A frame was handed to the channel (which may still drop it).
    FrameSent {
        kind: FrameType,
        seq: u32,
        len: usize,
        retransmission: bool,
    },
    /// A valid ACK arrived that moved `base` forward.
    AckReceived { seq: u32, base: u32 },
    /// A valid ACK arrived that moved nothing.
    DuplicateAck { seq: u32 },
    /// The retransmission timer fired with `outstanding` frames in flight.
    Timeout { base: u32, outstanding: u32 },
    /// A data frame was accepted in order.
    Accepted { seq: u32, len: usize },
    /// An incoming datagram was thrown away.
    Discarded { seq: Option<u32>, reason: DiscardReason },
    /// The transfer finished.
    Completed { bytes: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Failed to decode: bad checksum, bad length, unknown tag.
    Corrupt,
    /// Valid, but not the sequence number the receiver expects.
    OutOfOrder,
    /// Valid, but of a type this side has no use for.
    Unexpected,
}

/// Receives [`TransferEvent`]s.
pub trait EventSink: Send {
    fn on_event(&mut self, event: &TransferEvent);
}

/// Forwards events to the `log` facade under a component prefix.
#[derive(Debug, Clone)]
pub struct LogSink {
    prefix: &'static str,
}

impl LogSink {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }
}

impl EventSink for LogSink {
    fn on_event(&mut self, event: &TransferEvent) {
        let p = self.prefix;
        match event {
            TransferEvent::FrameSent {
                kind,
                seq,
                len,
                retransmission,
            } => {
                let tag = if *retransmission { " (rtx)" } else { "" };
                log::debug!("[{p}] → {kind} seq={seq} len={len}{tag}");
            }
            TransferEvent::AckReceived { seq, base } => {
                log::debug!("[{p}] ← ACK seq={seq} base={base}");
            }
            TransferEvent::DuplicateAck { seq } => log::debug!("[{p}] ← dup ACK seq={seq}"),
            TransferEvent::Timeout { base, outstanding } => {
                log::debug!("[{p}] timeout, go back to {base} ({outstanding} frame(s))");
            }
            TransferEvent::Accepted { seq, len } => {
                log::debug!("[{p}] ← DATA seq={seq} len={len} accepted");
            }
            TransferEvent::Discarded { seq, reason } => {
                log::debug!("[{p}] discard seq={seq:?} ({reason:?})");
            }
            TransferEvent::Completed { bytes } => log::info!("[{p}] complete, {bytes} bytes"),
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: &TransferEvent) {}
}

/// Counters describing one finished transfer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransferStats {
    /// Payload bytes delivered (receiver) or acknowledged (sender).
    pub bytes: u64,
    /// Distinct data frames originated.
    pub frames_originated: u64,
    /// Every data frame transmission, first sends and retransmissions alike.
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub acks_received: u64,
    pub duplicate_acks: u64,
    pub corrupt_frames: u64,
    pub out_of_order_frames: u64,
    pub acks_sent: u64,
    pub elapsed: Duration,
}

impl TransferStats {
    /// Payload bytes per second over the whole transfer.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// Share of transmissions that were first sends (`1.0` on a clean link).
    pub fn ack_efficiency(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            self.frames_originated as f64 / self.frames_sent as f64
        }
    }
}
