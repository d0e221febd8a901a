//! Entry point for `rdt-over-udp`.
//!
//! Parses CLI arguments and dispatches into **send**, **recv** or
//! **experiment** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, signal handling, argument
//! parsing, file I/O).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use rdt_over_udp::experiment::{self, ExperimentConfig, Scenario};
use rdt_over_udp::{
    ImpairedChannel, ImpairmentConfig, Receiver, Sender, TimeoutPolicy, TransferConfig, Transport,
    UdpTransport,
};

/// Reliable file transfer over UDP (stop-and-wait / Go-Back-N).
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// More log output (-v debug, -vv trace).  RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a listening receiver.
    Send {
        file: PathBuf,
        /// Receiver address (e.g. 127.0.0.1:9000).
        #[arg(long)]
        to: SocketAddr,
        /// Local address to bind.
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        #[command(flatten)]
        transfer: TransferOpts,
        #[command(flatten)]
        impairment: ImpairmentOpts,
    },
    /// Receive one transfer and write it to a file.
    Recv {
        file: PathBuf,
        /// Local address to listen on.
        #[arg(long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        #[command(flatten)]
        transfer: TransferOpts,
        #[command(flatten)]
        impairment: ImpairmentOpts,
    },
    /// Sweep impairment rates over in-process links and print CSV.
    Experiment {
        /// Scenarios to run (comma separated); all of them by default.
        #[arg(long, value_delimiter = ',')]
        scenario: Vec<Scenario>,
        /// Highest impairment rate in the sweep.
        #[arg(long, default_value_t = 0.6)]
        max_rate: f64,
        /// Rate increment.
        #[arg(long, default_value_t = 0.05)]
        step: f64,
        #[arg(long, default_value_t = 5)]
        trials: u32,
        /// Bytes transferred per trial.
        #[arg(long, default_value_t = 32 * 1024)]
        payload: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[command(flatten)]
        transfer: TransferOpts,
    },
}

#[derive(Args)]
struct TransferOpts {
    /// Go-Back-N window; 1 is stop-and-wait.
    #[arg(long, default_value_t = 1)]
    window: usize,
    /// Payload bytes per frame.
    #[arg(long, default_value_t = rdt_over_udp::config::DEFAULT_PACKET_SIZE)]
    packet_size: usize,
    /// Initial (or fixed) retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 50)]
    timeout_ms: u64,
    /// Keep the timeout constant instead of adapting it to measured RTT.
    #[arg(long)]
    fixed_timeout: bool,
    /// Receiver gives up after this many seconds without hearing from the
    /// sender mid-transfer; 0 waits forever.
    #[arg(long, default_value_t = 30)]
    idle_timeout_secs: u64,
}

impl TransferOpts {
    fn config(&self) -> TransferConfig {
        let initial = Duration::from_millis(self.timeout_ms);
        let timeout = if self.fixed_timeout {
            TimeoutPolicy::Fixed(initial)
        } else {
            TimeoutPolicy::Adaptive {
                initial,
                min: Duration::from_millis(10).min(initial),
                max: Duration::from_secs(2).max(initial),
            }
        };
        TransferConfig::go_back_n(self.window)
            .with_packet_size(self.packet_size)
            .with_timeout(timeout)
            .with_idle_timeout(
                (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs)),
            )
    }
}

#[derive(Args)]
struct ImpairmentOpts {
    /// Probability of dropping each outbound frame.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Probability of flipping one bit in each outbound frame.
    #[arg(long, default_value_t = 0.0)]
    bit_error: f64,
    /// RNG seed for the impairment model.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl ImpairmentOpts {
    fn config(&self) -> Result<ImpairmentConfig> {
        let cfg = ImpairmentConfig {
            loss_rate: self.loss,
            bit_error_rate: self.bit_error,
            seed: self.seed,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.mode {
        Mode::Send {
            file,
            to,
            bind,
            transfer,
            impairment,
        } => send(file, to, bind, transfer.config(), impairment.config()?).await,
        Mode::Recv {
            file,
            bind,
            transfer,
            impairment,
        } => recv(file, bind, transfer.config(), impairment.config()?).await,
        Mode::Experiment {
            scenario,
            max_rate,
            step,
            trials,
            payload,
            seed,
            transfer,
        } => {
            anyhow::ensure!(step > 0.0, "--step must be positive");
            let steps = (max_rate / step + 1e-9).floor() as u32;
            let config = ExperimentConfig {
                scenarios: if scenario.is_empty() {
                    Scenario::ALL.to_vec()
                } else {
                    scenario
                },
                rates: (0..=steps).map(|i| f64::from(i) * step).collect(),
                trials,
                payload_len: payload,
                transfer: transfer.config(),
                seed,
            };
            let rows = experiment::run_experiment(&config).await?;
            print!("{}", experiment::to_csv(&rows));
            Ok(())
        }
    }
}

/// Bind a UDP socket and close it on Ctrl-C so a blocked engine returns.
async fn bind_with_shutdown(bind: SocketAddr) -> Result<Arc<UdpTransport>> {
    let socket = Arc::new(
        UdpTransport::bind(bind)
            .await
            .with_context(|| format!("binding {bind}"))?,
    );
    let handle = socket.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, closing {}", handle.local_addr());
            handle.close();
        }
    });
    Ok(socket)
}

async fn send(
    file: PathBuf,
    to: SocketAddr,
    bind: SocketAddr,
    config: TransferConfig,
    impairment: ImpairmentConfig,
) -> Result<()> {
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let socket = bind_with_shutdown(bind).await?;
    log::info!(
        "sending {} ({} bytes) from {} to {to}, window {}",
        file.display(),
        data.len(),
        socket.local_addr(),
        config.window_size
    );

    let mut sender = Sender::new(ImpairedChannel::new(socket, impairment), to, config)?;
    let stats = sender.send(&data).await?;
    log::info!(
        "done: {} bytes in {:.3}s ({:.1} KiB/s), {} retransmission(s), {} timeout(s), ack efficiency {:.3}",
        stats.bytes,
        stats.elapsed.as_secs_f64(),
        stats.throughput() / 1024.0,
        stats.retransmissions,
        stats.timeouts,
        stats.ack_efficiency()
    );
    Ok(())
}

async fn recv(
    file: PathBuf,
    bind: SocketAddr,
    config: TransferConfig,
    impairment: ImpairmentConfig,
) -> Result<()> {
    let socket = bind_with_shutdown(bind).await?;
    let mut receiver = Receiver::new(ImpairedChannel::new(socket, impairment), config)?;
    log::info!("listening on {}", receiver.local_addr());
    let delivery = receiver.run().await?;
    tokio::fs::write(&file, &delivery.data)
        .await
        .with_context(|| format!("writing {}", file.display()))?;
    log::info!(
        "received {} bytes from {} into {} ({} corrupt, {} out of order)",
        delivery.data.len(),
        receiver
            .peer()
            .map_or_else(|| "?".to_string(), |p| p.to_string()),
        file.display(),
        delivery.stats.corrupt_frames,
        delivery.stats.out_of_order_frames
    );
    Ok(())
}
