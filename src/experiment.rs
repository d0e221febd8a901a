//! Impairment sweeps: how does the protocol cope as the channel gets worse?
//!
//! A [`Scenario`] says *which* direction of the link is impaired and *how*;
//! a rate turns it into the sender-side and receiver-side
//! [`ImpairmentConfig`]s.  [`run_experiment`] runs `trials` in-process
//! transfers for every (scenario, rate) pair over [`MemoryTransport`] links
//! and averages the results into [`ExperimentRow`]s, which render as CSV.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::events::{NullSink, TransferStats};
use crate::memory::MemoryTransport;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::simulator::{ImpairedChannel, ImpairmentConfig};
use crate::socket::Transport;

/// Which faults are injected, and on which leg of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// No impairment; the rate is ignored.
    Clean,
    /// ACKs (receiver → sender) get bit errors.
    AckCorruption,
    /// Data frames (sender → receiver) get bit errors.
    DataCorruption,
    /// ACKs are dropped.
    AckLoss,
    /// Data frames are dropped.
    DataLoss,
    /// Both legs lose and corrupt frames, each at half the rate.
    Mixed,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Clean,
        Scenario::AckCorruption,
        Scenario::DataCorruption,
        Scenario::AckLoss,
        Scenario::DataLoss,
        Scenario::Mixed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Clean => "clean",
            Scenario::AckCorruption => "ack-corruption",
            Scenario::DataCorruption => "data-corruption",
            Scenario::AckLoss => "ack-loss",
            Scenario::DataLoss => "data-loss",
            Scenario::Mixed => "mixed",
        }
    }

    /// `(sender side, receiver side)` impairment for `rate`.
    ///
    /// The two sides draw from different seeds so their faults are
    /// independent.
    pub fn impairments(self, rate: f64, seed: u64) -> (ImpairmentConfig, ImpairmentConfig) {
        let clean = |seed| ImpairmentConfig {
            seed,
            ..ImpairmentConfig::default()
        };
        let (tx_seed, rx_seed) = (seed, seed.wrapping_add(0x9e37_79b9));
        match self {
            Scenario::Clean => (clean(tx_seed), clean(rx_seed)),
            Scenario::AckCorruption => (clean(tx_seed), ImpairmentConfig::noisy(rate, rx_seed)),
            Scenario::DataCorruption => (ImpairmentConfig::noisy(rate, tx_seed), clean(rx_seed)),
            Scenario::AckLoss => (clean(tx_seed), ImpairmentConfig::lossy(rate, rx_seed)),
            Scenario::DataLoss => (ImpairmentConfig::lossy(rate, tx_seed), clean(rx_seed)),
            Scenario::Mixed => {
                let half = |seed| ImpairmentConfig {
                    loss_rate: rate / 2.0,
                    bit_error_rate: rate / 2.0,
                    seed,
                };
                (half(tx_seed), half(rx_seed))
            }
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Scenario::ALL.iter().map(|sc| sc.name()).collect();
                format!("unknown scenario `{s}` (expected one of: {})", names.join(", "))
            })
    }
}

/// Parameters of a sweep.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub scenarios: Vec<Scenario>,
    /// Impairment rates to try, each in `[0, 1]`.
    pub rates: Vec<f64>,
    /// Transfers per (scenario, rate) pair.
    pub trials: u32,
    /// Size of the synthetic payload sent in each trial.
    pub payload_len: usize,
    pub transfer: TransferConfig,
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            scenarios: Scenario::ALL.to_vec(),
            rates: default_rates(),
            trials: 5,
            payload_len: 32 * 1024,
            transfer: TransferConfig::default(),
            seed: 1,
        }
    }
}

/// 0 % to 60 % in steps of 5 %.
pub fn default_rates() -> Vec<f64> {
    (0..=12).map(|i| f64::from(i) * 0.05).collect()
}

/// Averages over the trials of one (scenario, rate) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRow {
    pub scenario: Scenario,
    pub rate: f64,
    pub trials: u32,
    /// Trials that delivered the payload intact.
    pub completed: u32,
    pub mean_elapsed: Duration,
    /// Payload bytes per second.
    pub mean_throughput: f64,
    pub mean_retransmissions: f64,
    pub mean_timeouts: f64,
    pub mean_ack_efficiency: f64,
}

impl ExperimentRow {
    pub const CSV_HEADER: &'static str = "scenario,rate,trials,completed,elapsed_ms,throughput_bps,retransmissions,timeouts,ack_efficiency";

    pub fn to_csv(&self) -> String {
        format!(
            "{},{:.2},{},{},{:.3},{:.1},{:.2},{:.2},{:.4}",
            self.scenario,
            self.rate,
            self.trials,
            self.completed,
            self.mean_elapsed.as_secs_f64() * 1000.0,
            self.mean_throughput,
            self.mean_retransmissions,
            self.mean_timeouts,
            self.mean_ack_efficiency,
        )
    }

    fn from_trials(scenario: Scenario, rate: f64, trials: u32, done: &[TransferStats]) -> Self {
        let n = done.len().max(1) as f64;
        let mean = |f: fn(&TransferStats) -> f64| done.iter().map(f).sum::<f64>() / n;
        let elapsed: Duration = done.iter().map(|s| s.elapsed).sum();
        Self {
            scenario,
            rate,
            trials,
            completed: done.len() as u32,
            mean_elapsed: elapsed.div_f64(n),
            mean_throughput: mean(TransferStats::throughput),
            mean_retransmissions: mean(|s| s.retransmissions as f64),
            mean_timeouts: mean(|s| s.timeouts as f64),
            mean_ack_efficiency: mean(TransferStats::ack_efficiency),
        }
    }
}

/// Render rows as CSV, header included.
pub fn to_csv(rows: &[ExperimentRow]) -> String {
    let mut out = String::from(ExperimentRow::CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_csv());
        out.push('\n');
    }
    out
}

/// Run the whole sweep.
///
/// A trial that aborts is logged and left out of the averages; only an invalid
/// configuration fails the sweep.
pub async fn run_experiment(config: &ExperimentConfig) -> Result<Vec<ExperimentRow>, TransferError> {
    config.transfer.validate()?;
    for &rate in &config.rates {
        ImpairmentConfig::lossy(rate, 0).validate()?;
    }
    if config.trials == 0 {
        return Err(TransferError::InvalidConfig("trials must be at least 1".into()));
    }

    let payload = synthetic_payload(config.payload_len);
    let mut rows = Vec::with_capacity(config.scenarios.len() * config.rates.len());

    for &scenario in &config.scenarios {
        for &rate in &config.rates {
            let mut done = Vec::with_capacity(config.trials as usize);
            for trial in 0..config.trials {
                let seed = config.seed.wrapping_mul(1_000_003).wrapping_add(u64::from(trial));
                let (tx, rx) = scenario.impairments(rate, seed);
                match run_trial(&payload, &config.transfer, tx, rx).await {
                    Ok(stats) => done.push(stats),
                    Err(e) => log::warn!("[exp] {scenario} rate={rate:.2} trial {trial} failed: {e}"),
                }
            }
            let row = ExperimentRow::from_trials(scenario, rate, config.trials, &done);
            log::info!(
                "[exp] {scenario} rate={rate:.2}: {}/{} ok, {:.1} ms, {:.1} rtx",
                row.completed,
                row.trials,
                row.mean_elapsed.as_secs_f64() * 1000.0,
                row.mean_retransmissions
            );
            rows.push(row);
        }
    }
    Ok(rows)
}

/// One in-process transfer of `payload`; returns the sender's statistics.
pub async fn run_trial(
    payload: &[u8],
    transfer: &TransferConfig,
    sender_side: ImpairmentConfig,
    receiver_side: ImpairmentConfig,
) -> Result<TransferStats, TransferError> {
    let (a, b) = MemoryTransport::pair();
    let peer = b.local_addr();
    let sender =
        Sender::new(ImpairedChannel::new(a, sender_side), peer, transfer.clone())?.with_sink(NullSink);
    let receiver =
        Receiver::new(ImpairedChannel::new(b, receiver_side), transfer.clone())?.with_sink(NullSink);

    // Each engine owns its endpoint inside its own future, so the endpoint
    // drops the moment that side finishes.  A sender still retrying FIN sees
    // the receiver go away, and a receiver whose FIN never arrived sees the
    // sender go away, instead of either waiting on a silent link.
    let (sent, received) = tokio::join!(
        async move {
            let mut sender = sender;
            sender.send(payload).await
        },
        async move {
            let mut receiver = receiver;
            receiver.run().await
        }
    );
    let stats = sent?;
    let delivery = received?;
    if delivery.data != payload {
        return Err(TransferError::DeliveryMismatch {
            sent: payload.len(),
            delivered: delivery.data.len(),
        });
    }
    Ok(stats)
}

fn synthetic_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
