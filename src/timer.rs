//! Retransmission timer and adaptive timeout estimation.
//!
//! Reliable delivery requires that unacknowledged frames are re-sent if no
//! ACK arrives within a bounded time.  This module provides:
//! - [`RetransmitTimer`]: a single-shot deadline bound to the oldest
//!   unacknowledged frame.  It is *polled*: the sender loop asks
//!   [`RetransmitTimer::remaining`] how long it may block in a receive, then
//!   checks [`RetransmitTimer::is_expired`].
//! - [`RttEstimator`]: smooths round-trip samples into a timeout:
//!   `estimated = (1−α)·estimated + α·sample`,
//!   `deviation = (1−β)·deviation + β·|sample − estimated|`,
//!   `timeout   = estimated + 4·deviation`,
//!   and doubles the timeout on expiry (exponential back-off) up to a ceiling.
//!
//! Time is read from `tokio::time::Instant` so paused-clock tests drive the
//! timer deterministically.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::TimeoutPolicy;

/// Smoothing factor for the RTT mean.
pub const ALPHA: f64 = 0.125;
/// Smoothing factor for the RTT deviation.
pub const BETA: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
}

/// Single-shot retransmission deadline.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    deadline: Option<Instant>,
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RetransmitTimer {
    /// A stopped timer.
    pub fn new() -> Self {
        Self { deadline: None }
    }

    pub fn state(&self) -> TimerState {
        if self.deadline.is_some() {
            TimerState::Running
        } else {
            TimerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm the timer: deadline = now + `duration`.
    pub fn start(&mut self, duration: Duration) {
        self.deadline = Some(Instant::now() + duration);
    }

    /// Fresh deadline whether or not the timer was running.
    pub fn restart(&mut self, duration: Duration) {
        self.start(duration);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// `true` once a running timer reaches its deadline; always `false` when
    /// stopped.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before expiry, `Duration::ZERO` once expired, `None` when
    /// stopped.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// EWMA round-trip estimator producing the retransmission timeout.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// `false` pins the timeout to its initial value.
    adaptive: bool,
    estimated: Duration,
    deviation: Duration,
    timeout: Duration,
    min: Duration,
    max: Duration,
}

impl RttEstimator {
    /// Estimator for the given policy.
    ///
    /// Before the first sample `estimated = initial` and
    /// `deviation = initial / 2`, and the timeout is `initial` itself.
    pub fn new(policy: TimeoutPolicy) -> Self {
        match policy {
            TimeoutPolicy::Fixed(timeout) => Self {
                adaptive: false,
                estimated: timeout,
                deviation: Duration::ZERO,
                timeout,
                min: timeout,
                max: timeout,
            },
            TimeoutPolicy::Adaptive { initial, min, max } => Self {
                adaptive: true,
                estimated: initial,
                deviation: initial / 2,
                timeout: initial.clamp(min, max),
                min,
                max,
            },
        }
    }

    /// Current retransmission timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn estimated_rtt(&self) -> Duration {
        self.estimated
    }

    pub fn deviation(&self) -> Duration {
        self.deviation
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// Fold one RTT sample into the estimate and recompute the timeout.
    ///
    /// The deviation uses the freshly updated estimate.  Ignored in fixed
    /// mode.
    pub fn record_sample(&mut self, sample: Duration) {
        if !self.adaptive {
            return;
        }
        let est = (1.0 - ALPHA) * self.estimated.as_secs_f64() + ALPHA * sample.as_secs_f64();
        let diff = (sample.as_secs_f64() - est).abs();
        let dev = (1.0 - BETA) * self.deviation.as_secs_f64() + BETA * diff;

        self.estimated = Duration::from_secs_f64(est);
        self.deviation = Duration::from_secs_f64(dev);
        self.timeout = (self.estimated + self.deviation * 4).clamp(self.min, self.max);
    }

    /// Double the timeout after an expiry, capped at the ceiling.
    pub fn back_off(&mut self) {
        if self.adaptive {
            self.timeout = (self.timeout * 2).min(self.max);
        }
    }

    /// Undo any back-off: recompute the timeout from the current estimates.
    ///
    /// Called when an ACK makes progress again.
    pub fn reset(&mut self) {
        if self.adaptive {
            self.timeout = (self.estimated + self.deviation * 4).clamp(self.min, self.max);
        }
    }
}
