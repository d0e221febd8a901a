//! Transfer session parameters.
//!
//! One [`TransferConfig`] is handed to each sender / receiver session.  There
//! are no process-wide knobs: everything the engines need arrives here, and
//! impairment settings travel separately in
//! [`crate::simulator::ImpairmentConfig`].

use std::time::Duration;

use crate::error::TransferError;
use crate::packet::HEADER_LEN;
use crate::socket::MAX_DATAGRAM;

/// Default payload bytes per data frame.
pub const DEFAULT_PACKET_SIZE: usize = 1024;
/// Largest payload that still fits a single UDP datagram with our header.
pub const MAX_PACKET_SIZE: usize = MAX_DATAGRAM - 8 - 20 - HEADER_LEN;
/// Upper bound on the Go-Back-N window.
pub const MAX_WINDOW_SIZE: usize = 50;

/// How the retransmission timeout is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Constant timeout, no back-off.
    Fixed(Duration),
    /// RTT-driven EWMA estimate, clamped to `[min, max]`, doubled on expiry.
    Adaptive {
        initial: Duration,
        min: Duration,
        max: Duration,
    },
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy::Adaptive {
            initial: Duration::from_millis(50),
            min: Duration::from_millis(10),
            max: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Payload bytes per data frame.
    pub packet_size: usize,
    /// Go-Back-N window N; `1` is stop-and-wait.
    pub window_size: usize,
    pub timeout: TimeoutPolicy,
    /// Receive wait used while nothing is outstanding.
    pub poll_interval: Duration,
    /// Give up after this many consecutive timeouts with no progress.
    /// `None` retries forever.
    pub max_timeouts: Option<u32>,
    /// FIN transmissions attempted before completing without its ACK.
    pub fin_retries: u32,
    /// How long a receiver keeps answering duplicate FINs after finishing.
    pub linger: Duration,
    /// Receiver gives up when no valid frame has arrived from its peer for
    /// this long.  Only counted once something was accepted; `None` waits
    /// forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            window_size: 1,
            timeout: TimeoutPolicy::default(),
            poll_interval: Duration::from_millis(50),
            max_timeouts: None,
            fin_retries: 10,
            linger: Duration::from_millis(500),
            idle_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl TransferConfig {
    /// Stop-and-wait with otherwise default settings.
    pub fn stop_and_wait() -> Self {
        Self::default()
    }

    /// Go-Back-N with window `n` and otherwise default settings.
    pub fn go_back_n(n: usize) -> Self {
        Self {
            window_size: n,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Check every field against its bounds.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.packet_size == 0 || self.packet_size > MAX_PACKET_SIZE {
            return Err(TransferError::InvalidConfig(format!(
                "packet_size must be within 1..={MAX_PACKET_SIZE}, got {}",
                self.packet_size
            )));
        }
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SIZE {
            return Err(TransferError::InvalidConfig(format!(
                "window_size must be within 1..={MAX_WINDOW_SIZE}, got {}",
                self.window_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(TransferError::InvalidConfig(
                "poll_interval must be non-zero".into(),
            ));
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(TransferError::InvalidConfig(
                "idle_timeout must be non-zero".into(),
            ));
        }
        match self.timeout {
            TimeoutPolicy::Fixed(t) if t.is_zero() => Err(TransferError::InvalidConfig(
                "timeout must be non-zero".into(),
            )),
            TimeoutPolicy::Adaptive { initial, min, max }
                if min.is_zero() || min > max || initial.is_zero() =>
            {
                Err(TransferError::InvalidConfig(format!(
                    "adaptive timeout needs 0 < min <= max and initial > 0 \
                     (initial {initial:?}, min {min:?}, max {max:?})"
                )))
            }
            _ => Ok(()),
        }
    }
}
