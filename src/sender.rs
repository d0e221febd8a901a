//! Sender engine: drives a [`GbnSender`] window over an impaired channel.
//!
//! One control loop, no background tasks:
//!
//! ```text
//!        ┌──────────────────────────────────────────────────────────┐
//!        ▼                                                          │
//!   originate ── while next < base + N and chunks remain ──▶ send   │
//!        │                                                          │
//!   await ACK ── recv bounded by the timer's remaining time ────────┤
//!        │         valid ACK ≥ base: base = seq + 1, restart/stop   │
//!        │         anything else: no state change                   │
//!        │                                                          │
//!   timer expired? ── resend base..next−1, restart timer ───────────┘
//!
//!   all chunks originated and base == next ──▶ FIN handshake ──▶ done
//! ```
//!
//! Stop-and-wait is the same loop with `window_size = 1`.  The only failure
//! surfaced to the caller is the transport becoming unusable (plus the
//! optional `max_timeouts` give-up); loss, corruption and duplicate ACKs are
//! absorbed by the loop.

use std::net::SocketAddr;

use tokio::time::Instant;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransportError};
use crate::events::{DiscardReason, EventSink, LogSink, TransferEvent, TransferStats};
use crate::gbn_sender::{AckOutcome, GbnSender};
use crate::packet::{Frame, FrameType};
use crate::simulator::ImpairedChannel;
use crate::socket::Transport;
use crate::state::SenderState;
use crate::timer::{RetransmitTimer, RttEstimator};

/// One outbound transfer session.
pub struct Sender<T> {
    channel: ImpairedChannel<T>,
    peer: SocketAddr,
    config: TransferConfig,
    window: GbnSender,
    timer: RetransmitTimer,
    rtt: RttEstimator,
    state: SenderState,
    stats: TransferStats,
    sink: Box<dyn EventSink>,
    consecutive_timeouts: u32,
}

impl<T: Transport> Sender<T> {
    /// Prepare a session sending to `peer` over `channel`.
    pub fn new(
        channel: ImpairedChannel<T>,
        peer: SocketAddr,
        config: TransferConfig,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            channel,
            peer,
            window: GbnSender::new(config.window_size),
            timer: RetransmitTimer::new(),
            rtt: RttEstimator::new(config.timeout),
            config,
            state: SenderState::default(),
            stats: TransferStats::default(),
            sink: Box::new(LogSink::new("gbn:send")),
            consecutive_timeouts: 0,
        })
    }

    /// Replace the default logging sink.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn window(&self) -> &GbnSender {
        &self.window
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> std::time::Duration {
        self.rtt.timeout()
    }

    /// Transfer `data`, split into `packet_size` chunks, and wait until every
    /// byte is acknowledged.
    pub async fn send(&mut self, data: &[u8]) -> Result<TransferStats, TransferError> {
        let chunks: Vec<Vec<u8>> = data
            .chunks(self.config.packet_size)
            .map(<[u8]>::to_vec)
            .collect();
        self.send_chunks(chunks).await
    }

    /// Transfer a stream of pre-cut chunks, each at most `packet_size` bytes.
    pub async fn send_chunks<I>(&mut self, chunks: I) -> Result<TransferStats, TransferError>
    where
        I: IntoIterator<Item = Vec<u8>>,
        I::IntoIter: Send,
    {
        let started = Instant::now();
        let result = self.run(chunks.into_iter()).await;
        self.stats.elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.state = SenderState::Done;
                self.sink.on_event(&TransferEvent::Completed {
                    bytes: self.stats.bytes,
                });
                Ok(self.stats.clone())
            }
            Err(e) => {
                self.state = SenderState::Aborted;
                log::warn!("[gbn:send] aborted at base={}: {e}", self.window.base());
                Err(e)
            }
        }
    }

    async fn run<I>(&mut self, mut chunks: I) -> Result<(), TransferError>
    where
        I: Iterator<Item = Vec<u8>> + Send,
    {
        let mut exhausted = false;
        loop {
            // Originate: fill the window, never past base + N.
            while !exhausted && self.window.can_send() {
                match chunks.next() {
                    Some(chunk) => self.originate(chunk).await?,
                    None => exhausted = true,
                }
            }
            if exhausted && !self.window.has_unacked() {
                break;
            }

            // Await: one bounded receive, then check the timer.
            let wait = self
                .timer
                .remaining()
                .unwrap_or(self.config.poll_interval);
            if let Some((bytes, from)) = self.channel.recv(wait).await? {
                self.on_datagram(&bytes, from);
            }
            if self.timer.is_expired() {
                self.on_timeout().await?;
            }
        }
        self.finish().await
    }

    async fn originate(&mut self, chunk: Vec<u8>) -> Result<(), TransferError> {
        if chunk.len() > self.config.packet_size {
            return Err(TransferError::InvalidConfig(format!(
                "chunk of {} bytes exceeds packet_size {}",
                chunk.len(),
                self.config.packet_size
            )));
        }
        let window_was_empty = !self.window.has_unacked();
        let slot = self
            .window
            .originate(chunk)
            .ok_or(TransferError::SequenceSpaceExhausted)?;

        self.channel.send(&slot.bytes, self.peer).await?;
        self.stats.frames_originated += 1;
        self.stats.frames_sent += 1;
        self.sink.on_event(&TransferEvent::FrameSent {
            kind: FrameType::Data,
            seq: slot.seq,
            len: slot.payload_len,
            retransmission: false,
        });

        if window_was_empty {
            self.timer.start(self.rtt.timeout());
        }
        Ok(())
    }

    /// Interpret one incoming datagram.  Only a valid ACK can change state.
    fn on_datagram(&mut self, bytes: &[u8], from: SocketAddr) {
        if from != self.peer {
            log::trace!("[gbn:send] ignoring datagram from stranger {from}");
            return;
        }
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::trace!("[gbn:send] undecodable datagram: {e}");
                self.stats.corrupt_frames += 1;
                self.sink.on_event(&TransferEvent::Discarded {
                    seq: None,
                    reason: DiscardReason::Corrupt,
                });
                return;
            }
        };
        if frame.kind != FrameType::Ack {
            self.sink.on_event(&TransferEvent::Discarded {
                seq: Some(frame.seq),
                reason: DiscardReason::Unexpected,
            });
            return;
        }

        self.stats.acks_received += 1;
        match self.window.on_ack(frame.seq) {
            AckOutcome::Advanced {
                rtt_origin, bytes, ..
            } => {
                self.stats.bytes += bytes;
                self.consecutive_timeouts = 0;
                match rtt_origin {
                    Some(sent_at) => self.rtt.record_sample(sent_at.elapsed()),
                    None => self.rtt.reset(),
                }
                self.sink.on_event(&TransferEvent::AckReceived {
                    seq: frame.seq,
                    base: self.window.base(),
                });

                if self.window.has_unacked() {
                    self.timer.restart(self.rtt.timeout());
                } else {
                    self.timer.stop();
                }
            }
            AckOutcome::Duplicate | AckOutcome::OutOfRange => {
                self.stats.duplicate_acks += 1;
                self.sink
                    .on_event(&TransferEvent::DuplicateAck { seq: frame.seq });
            }
        }
    }

    /// Go back N: resend every outstanding frame in order, restart the timer.
    async fn on_timeout(&mut self) -> Result<(), TransferError> {
        self.stats.timeouts += 1;
        self.consecutive_timeouts += 1;
        if let Some(max) = self.config.max_timeouts {
            if self.consecutive_timeouts > max {
                return Err(TransferError::PeerUnresponsive(max));
            }
        }

        self.sink.on_event(&TransferEvent::Timeout {
            base: self.window.base(),
            outstanding: self.window.in_flight(),
        });
        self.rtt.back_off();

        for slot in self.window.window_entries() {
            self.channel.send(&slot.bytes, self.peer).await?;
            self.stats.retransmissions += 1;
            self.stats.frames_sent += 1;
            self.sink.on_event(&TransferEvent::FrameSent {
                kind: FrameType::Data,
                seq: slot.seq,
                len: slot.payload_len,
                retransmission: true,
            });
        }
        self.window.on_retransmit();
        self.timer.restart(self.rtt.timeout());
        Ok(())
    }

    /// End-of-transfer handshake: FIN occupying sequence number `next`.
    ///
    /// Every data frame is already acknowledged here, so a FIN whose ACK never
    /// comes back only costs a warning.
    async fn finish(&mut self) -> Result<(), TransferError> {
        self.state = SenderState::Closing;
        let fin_seq = self.window.next_seq();
        let fin = Frame::fin(fin_seq).encode();
        let attempts = self.config.fin_retries.max(1);

        for attempt in 0..attempts {
            self.channel.send(&fin, self.peer).await?;
            self.sink.on_event(&TransferEvent::FrameSent {
                kind: FrameType::Fin,
                seq: fin_seq,
                len: 0,
                retransmission: attempt > 0,
            });

            let deadline = Instant::now() + self.rtt.timeout();
            loop {
                let wait = deadline.saturating_duration_since(Instant::now());
                if wait.is_zero() {
                    break;
                }
                match self.channel.recv(wait).await {
                    Ok(Some((bytes, from))) if from == self.peer => match Frame::decode(&bytes) {
                        Ok(f) if f.kind == FrameType::Ack && f.seq == fin_seq => {
                            log::debug!("[gbn:send] ← ACK seq={fin_seq} (FIN), closed");
                            return Ok(());
                        }
                        Ok(f) if f.kind == FrameType::Ack => {
                            self.stats.duplicate_acks += 1;
                            self.sink.on_event(&TransferEvent::DuplicateAck { seq: f.seq });
                        }
                        Ok(_) => {}
                        Err(_) => self.stats.corrupt_frames += 1,
                    },
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(TransportError::Disconnected) => {
                        log::warn!("[gbn:send] peer gone before FIN was ACKed; closing");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            self.rtt.back_off();
        }

        log::warn!("[gbn:send] FIN not ACKed after {attempts} attempt(s); force-closing");
        Ok(())
    }
}
