//! Go-Back-N send-side window state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight frames.
//! With `N = 1` it *is* stop-and-wait: originate and acknowledge strictly
//! alternate, with no separate code path.
//!
//! # Protocol contract
//!
//! - At most `window_size` frames may be in flight at once; origination is
//!   refused (deferred, never dropped) while `next == base + N`.
//! - ACKs are **cumulative**: an ACK for `K` means every frame up to and
//!   including `K` arrived, so `base` jumps to `K + 1`.
//! - ACKs below `base` are stale duplicates and change nothing; ACKs for
//!   sequence numbers never sent (`≥ next`) are ignored.
//! - On timeout, the caller retransmits **all** frames from `base` to
//!   `next − 1` (go back to N).
//!
//! Sequence numbers grow monotonically from zero and are never reused.
//!
//! This module only manages state; all socket I/O is the caller's responsibility.

use tokio::time::Instant;

use crate::packet::Frame;

// ---------------------------------------------------------------------------
// WindowSlot
// ---------------------------------------------------------------------------

/// A single in-flight frame occupying one slot in the retransmit window.
#[derive(Debug, Clone)]
pub struct WindowSlot {
    pub seq: u32,
    /// The encoded frame, ready to hand to the channel again.
    pub bytes: Vec<u8>,
    /// Payload length, for accounting.
    pub payload_len: usize,
    /// Total number of times this frame has been transmitted.
    pub tx_count: u32,
    /// Time of the most recent transmission (for RTT sampling).
    pub sent_at: Instant,
}

/// Outcome of feeding one ACK to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// `base` advanced over `acked` frames.
    Advanced {
        acked: u32,
        /// Send time of the newest acknowledged frame, when it was never
        /// retransmitted (Karn's rule: only such frames give RTT samples).
        rtt_origin: Option<Instant>,
        /// Payload bytes newly acknowledged.
        bytes: u64,
    },
    /// Stale or duplicate: `seq < base`.
    Duplicate,
    /// Acknowledges something never sent: `seq ≥ next`.
    OutOfRange,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one transfer session.
///
/// # Sequence-number layout
///
/// ```text
///    base               next           base + N
///      │                  │                 │
///  ────┼──────────────────┼─────────────────┼──────▶ seq space
///      │ <── in flight ──▶│ <── sendable ──▶│
/// ```
///
/// In-flight frames live in a buffer of `N` slots indexed by `seq mod N`.
#[derive(Debug)]
pub struct GbnSender {
    /// Sequence number of the **oldest** unacked frame (left window edge).
    base: u32,

    /// Sequence number to use for the **next** new frame.
    next: u32,

    /// Maximum number of frames that may be in flight simultaneously (N).
    window_size: u32,

    slots: Vec<Option<WindowSlot>>,
}

impl GbnSender {
    /// Create a new [`GbnSender`] with window size `N` (≥ 1).
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next: 0,
            window_size: window_size as u32,
            slots: vec![None; window_size],
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next
    }

    pub fn window_size(&self) -> usize {
        self.window_size as usize
    }

    /// `true` when there is room for at least one more in-flight frame.
    pub fn can_send(&self) -> bool {
        self.next - self.base < self.window_size
    }

    /// Number of frames currently awaiting acknowledgement.
    pub fn in_flight(&self) -> u32 {
        self.next - self.base
    }

    /// `true` when at least one frame is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        self.base != self.next
    }

    /// Frame `payload` as the next data frame, store it in the window and
    /// advance `next`.
    ///
    /// Returns `None` without touching any state when the window is full or
    /// the sequence space is used up.
    pub fn originate(&mut self, payload: Vec<u8>) -> Option<&WindowSlot> {
        if !self.can_send() || self.next == u32::MAX {
            return None;
        }
        let seq = self.next;
        let payload_len = payload.len();
        let bytes = Frame::data(seq, payload).encode();
        let idx = self.slot_index(seq);
        self.slots[idx] = Some(WindowSlot {
            seq,
            bytes,
            payload_len,
            tx_count: 1,
            sent_at: Instant::now(),
        });
        self.next += 1;
        self.slots[idx].as_ref()
    }

    /// Process a cumulative ACK for `seq`.
    pub fn on_ack(&mut self, seq: u32) -> AckOutcome {
        if seq < self.base {
            return AckOutcome::Duplicate;
        }
        if seq >= self.next {
            return AckOutcome::OutOfRange;
        }

        let mut bytes = 0u64;
        let mut rtt_origin = None;
        for s in self.base..=seq {
            let idx = self.slot_index(s);
            if let Some(slot) = self.slots[idx].take() {
                bytes += slot.payload_len as u64;
                if s == seq && slot.tx_count == 1 {
                    rtt_origin = Some(slot.sent_at);
                }
            }
        }
        let acked = seq + 1 - self.base;
        self.base = seq + 1;
        AckOutcome::Advanced {
            acked,
            rtt_origin,
            bytes,
        }
    }

    /// Iterate over all in-flight frames from oldest to newest.
    ///
    /// Used by the engine to retransmit all unacked frames on timeout (the
    /// "go back N" step).
    pub fn window_entries(&self) -> impl Iterator<Item = &WindowSlot> + '_ {
        (self.base..self.next).filter_map(move |s| self.slots[self.slot_index(s)].as_ref())
    }

    /// Increment the transmission count and refresh `sent_at` for every
    /// in-flight frame.
    ///
    /// Call this immediately after retransmitting the entire window.
    pub fn on_retransmit(&mut self) {
        let now = Instant::now();
        for slot in self.slots.iter_mut().flatten() {
            slot.tx_count += 1;
            slot.sent_at = now;
        }
    }

    fn slot_index(&self, seq: u32) -> usize {
        (seq % self.window_size) as usize
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
