//! Session lifecycle states.
//!
//! A transfer session is one-directional and short-lived: it exists from the
//! first data frame until the end-of-transfer handshake completes or the
//! transport fails.  The engines record their current phase here so callers
//! (and logs) can tell where a session stopped.
//!
//! ```text
//!  sender:    Sending ──all data ACKed──▶ Closing ──FIN ACKed / retries spent──▶ Done
//!                │                           │
//!                └────── transport error ────┴──────────────────────────────────▶ Aborted
//!
//!  receiver:  Receiving ──FIN accepted──▶ Lingering ──linger elapsed / peer gone──▶ Done
//!                │
//!                └────── transport error ─────────────────────────────────────────▶ Aborted
//! ```

/// Phases of a sender session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Originating data frames and processing ACKs.
    #[default]
    Sending,
    /// Every data frame acknowledged; FIN outstanding.
    Closing,
    Done,
    Aborted,
}

/// Phases of a receiver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Accepting in-order data frames.
    #[default]
    Receiving,
    /// FIN accepted; re-acknowledging stragglers before shutting down.
    Lingering,
    Done,
    Aborted,
}

impl SenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SenderState::Done | SenderState::Aborted)
    }
}

impl ReceiverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReceiverState::Done | ReceiverState::Aborted)
    }
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
