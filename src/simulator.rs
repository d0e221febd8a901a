//! Impaired channel: loss and bit-error injection for a datagram transport.
//!
//! Real networks drop and corrupt packets.  To exercise the reliability
//! machinery without depending on actual network conditions, this module
//! provides an [`ImpairedChannel`] that wraps any [`Transport`] and intercepts
//! sends, applying a fault model:
//!
//! | Fault      | Description                                               |
//! |------------|-----------------------------------------------------------|
//! | Loss       | Drop an outbound frame silently; the caller is not told.  |
//! | Bit error  | Flip one bit of a frame that is not dropped.  Applied to  |
//! |            | the already-checksummed bytes, so the receiver detects it.|
//!
//! *Whether* a given frame is impaired is decided by an [`ImpairmentPolicy`].
//! [`RandomImpairment`] draws from a seeded RNG so runs are reproducible;
//! tests plug in scripted policies to hit exact frames.
//!
//! Both ends of a link wrap their own transport, so data and ACKs are impaired
//! independently.

use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{TransferError, TransportError};
use crate::socket::Transport;

/// Probabilities for the random fault model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpairmentConfig {
    /// Probability that any given frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a surviving frame gets one bit flipped.
    pub bit_error_rate: f64,
    /// RNG seed; identical seeds give identical impairment sequences.
    pub seed: u64,
}

impl Default for ImpairmentConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            bit_error_rate: 0.0,
            seed: 0,
        }
    }
}

impl ImpairmentConfig {
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed,
            ..Self::default()
        }
    }

    pub fn noisy(bit_error_rate: f64, seed: u64) -> Self {
        Self {
            bit_error_rate,
            seed,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.loss_rate == 0.0 && self.bit_error_rate == 0.0
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        for (name, p) in [
            ("loss_rate", self.loss_rate),
            ("bit_error_rate", self.bit_error_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(TransferError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// Decides, frame by frame, what the channel does to outbound traffic.
pub trait ImpairmentPolicy: Send + Sync {
    /// `true` to drop `frame` without transmitting it.
    fn drop_frame(&mut self, frame: &[u8]) -> bool;

    /// Bit index (`0..frame.len() * 8`) to flip, or `None` to leave `frame`
    /// intact.  Only consulted for frames that were not dropped.
    fn corrupt_bit(&mut self, frame: &[u8]) -> Option<usize>;
}

/// Pass-through policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImpairment;

impl ImpairmentPolicy for NoImpairment {
    fn drop_frame(&mut self, _frame: &[u8]) -> bool {
        false
    }

    fn corrupt_bit(&mut self, _frame: &[u8]) -> Option<usize> {
        None
    }
}

/// Independent per-frame loss and bit errors from a seeded RNG.
#[derive(Debug, Clone)]
pub struct RandomImpairment {
    loss_rate: f64,
    bit_error_rate: f64,
    rng: StdRng,
}

impl RandomImpairment {
    pub fn new(config: ImpairmentConfig) -> Self {
        Self {
            loss_rate: config.loss_rate.clamp(0.0, 1.0),
            bit_error_rate: config.bit_error_rate.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }
}

impl ImpairmentPolicy for RandomImpairment {
    fn drop_frame(&mut self, _frame: &[u8]) -> bool {
        self.loss_rate > 0.0 && self.rng.random_bool(self.loss_rate)
    }

    fn corrupt_bit(&mut self, frame: &[u8]) -> Option<usize> {
        if frame.is_empty() || self.bit_error_rate == 0.0 {
            return None;
        }
        if self.rng.random_bool(self.bit_error_rate) {
            Some(self.rng.random_range(0..frame.len() * 8))
        } else {
            None
        }
    }
}

/// A fault-injecting wrapper around the transport layer.
///
/// Receives pass straight through; only the outbound direction is impaired.
/// The policy is owned by the channel and mutated through `&mut self`, so no
/// locking is involved.
pub struct ImpairedChannel<T> {
    transport: T,
    policy: Box<dyn ImpairmentPolicy>,
}

impl<T: Transport> ImpairedChannel<T> {
    /// Wrap `transport` with the random fault model described by `config`.
    pub fn new(transport: T, config: ImpairmentConfig) -> Self {
        if config.is_clean() {
            Self::with_policy(transport, NoImpairment)
        } else {
            Self::with_policy(transport, RandomImpairment::new(config))
        }
    }

    /// Wrap `transport` with no impairment at all.
    pub fn clean(transport: T) -> Self {
        Self::with_policy(transport, NoImpairment)
    }

    /// Wrap `transport` with a caller-supplied policy.
    pub fn with_policy(transport: T, policy: impl ImpairmentPolicy + 'static) -> Self {
        Self {
            transport,
            policy: Box::new(policy),
        }
    }

    /// Send a frame through the simulated network.
    ///
    /// Returns `Ok(())` when the frame was dropped: loss is unsignalled.
    /// Only a failure of the underlying transport is an error.
    pub async fn send(&mut self, frame: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        if self.policy.drop_frame(frame) {
            log::trace!("[chan] dropped {} byte frame to {dest}", frame.len());
            return Ok(());
        }

        match self.policy.corrupt_bit(frame) {
            Some(bit) if bit < frame.len() * 8 => {
                let mut corrupt = frame.to_vec();
                corrupt[bit / 8] ^= 1 << (bit % 8);
                log::trace!("[chan] flipped bit {bit} of frame to {dest}");
                self.transport.send_to(&corrupt, dest).await
            }
            _ => self.transport.send_to(frame, dest).await,
        }
    }

    /// Receive the next datagram, waiting at most `wait`.
    pub async fn recv(
        &self,
        wait: Duration,
    ) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError> {
        self.transport.recv_from(wait).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}
