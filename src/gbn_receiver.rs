//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only **in-order** data frames are accepted (`seq == expected`).
//! - Out-of-order, duplicate and corrupt frames are **discarded**, never
//!   buffered for later reordering.
//! - Every frame that arrives is answered with a **cumulative ACK**: for the
//!   frame itself when accepted, otherwise for `expected − 1`, the last frame
//!   accepted.  The repeated ACK doubles as the negative acknowledgement.
//! - Before anything has been accepted there is no `expected − 1`, so rejected
//!   frames get no answer and the sender's timer recovers.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (see [`crate::receiver`]).

use crate::packet::{Frame, FrameType};

/// What the caller should do after feeding a frame to [`GbnReceiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// In-order data appended to the output; acknowledge `ack`.
    Accepted { ack: u32, len: usize },
    /// The end-of-transfer marker was accepted; acknowledge `ack` and finish.
    Finished { ack: u32 },
    /// Frame thrown away; re-acknowledge `ack` if there is one.
    Rejected { ack: Option<u32> },
}

impl Verdict {
    /// Sequence number to acknowledge, if any.
    pub fn ack(&self) -> Option<u32> {
        match *self {
            Verdict::Accepted { ack, .. } | Verdict::Finished { ack } => Some(ack),
            Verdict::Rejected { ack } => ack,
        }
    }
}

/// Go-Back-N receive-side state for one transfer session.
#[derive(Debug, Default)]
pub struct GbnReceiver {
    /// Next sequence number that will be accepted.
    expected: u32,

    /// Accepted payloads, concatenated in sequence order.
    output: Vec<u8>,

    finished: bool,
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Last accepted sequence number (`expected − 1`), if any.
    pub fn last_accepted(&self) -> Option<u32> {
        self.expected.checked_sub(1)
    }

    /// `true` once the end-of-transfer marker has been accepted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn into_output(self) -> Vec<u8> {
        self.output
    }

    /// Process a decoded, checksum-valid frame.
    pub fn on_frame(&mut self, frame: &Frame) -> Verdict {
        if frame.seq != self.expected || self.finished {
            return self.reject();
        }
        match frame.kind {
            FrameType::Data => {
                self.output.extend_from_slice(&frame.payload);
                self.expected += 1;
                Verdict::Accepted {
                    ack: frame.seq,
                    len: frame.payload.len(),
                }
            }
            FrameType::Fin => {
                self.expected += 1;
                self.finished = true;
                Verdict::Finished { ack: frame.seq }
            }
            FrameType::Ack => self.reject(),
        }
    }

    /// Process a datagram that failed to decode.
    pub fn on_corrupt(&mut self) -> Verdict {
        self.reject()
    }

    fn reject(&self) -> Verdict {
        Verdict::Rejected {
            ack: self.last_accepted(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let r = GbnReceiver::new();
        assert_eq!(r.expected(), 0);
        assert_eq!(r.last_accepted(), None);
        assert!(r.output().is_empty());
        assert!(!r.is_finished());
    }

    #[test]
    fn in_order_frame_accepted() {
        let mut r = GbnReceiver::new();
        let v = r.on_frame(&Frame::data(0, b"hello".to_vec()));
        assert_eq!(v, Verdict::Accepted { ack: 0, len: 5 });
        assert_eq!(r.expected(), 1);
        assert_eq!(r.output(), b"hello");
    }

    #[test]
    fn out_of_order_frame_discarded_and_reacked() {
        let mut r = GbnReceiver::new();
        r.on_frame(&Frame::data(0, b"a".to_vec()));

        let v = r.on_frame(&Frame::data(2, b"future".to_vec()));
        assert_eq!(v, Verdict::Rejected { ack: Some(0) });
        assert_eq!(r.expected(), 1);
        assert_eq!(r.output(), b"a");
    }

    #[test]
    fn duplicate_frame_discarded() {
        let mut r = GbnReceiver::new();
        r.on_frame(&Frame::data(0, b"hello".to_vec()));
        let v = r.on_frame(&Frame::data(0, b"hello".to_vec()));
        assert_eq!(v, Verdict::Rejected { ack: Some(0) });
        assert_eq!(r.output(), b"hello", "only the first copy is kept");
    }

    #[test]
    fn nothing_to_reack_before_first_acceptance() {
        let mut r = GbnReceiver::new();
        assert_eq!(r.on_corrupt(), Verdict::Rejected { ack: None });
        assert_eq!(
            r.on_frame(&Frame::data(3, vec![1])),
            Verdict::Rejected { ack: None }
        );
    }

    #[test]
    fn corrupt_after_progress_reacks_last() {
        let mut r = GbnReceiver::new();
        r.on_frame(&Frame::data(0, vec![1]));
        r.on_frame(&Frame::data(1, vec![2]));
        assert_eq!(r.on_corrupt().ack(), Some(1));
    }

    #[test]
    fn sequential_frames_concatenate() {
        let mut r = GbnReceiver::new();
        for (seq, chunk) in [&b"abc"[..], &b"de"[..], &b"fghi"[..]].iter().enumerate() {
            assert!(matches!(
                r.on_frame(&Frame::data(seq as u32, chunk.to_vec())),
                Verdict::Accepted { .. }
            ));
        }
        assert_eq!(r.into_output(), b"abcdefghi");
    }

    #[test]
    fn fin_in_order_finishes() {
        let mut r = GbnReceiver::new();
        r.on_frame(&Frame::data(0, b"x".to_vec()));
        assert_eq!(r.on_frame(&Frame::fin(1)), Verdict::Finished { ack: 1 });
        assert!(r.is_finished());

        // A retransmitted FIN is re-acknowledged, not re-accepted.
        assert_eq!(r.on_frame(&Frame::fin(1)), Verdict::Rejected { ack: Some(1) });
        // Late data after FIN changes nothing.
        assert_eq!(
            r.on_frame(&Frame::data(2, b"late".to_vec())),
            Verdict::Rejected { ack: Some(1) }
        );
        assert_eq!(r.output(), b"x");
    }

    #[test]
    fn fin_out_of_order_ignored() {
        let mut r = GbnReceiver::new();
        assert_eq!(r.on_frame(&Frame::fin(5)), Verdict::Rejected { ack: None });
        assert!(!r.is_finished());
    }

    #[test]
    fn stray_ack_is_rejected() {
        let mut r = GbnReceiver::new();
        assert_eq!(r.on_frame(&Frame::ack(0)), Verdict::Rejected { ack: None });
        assert_eq!(r.expected(), 0);
    }
}
