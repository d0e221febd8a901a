//! Receiver engine: drives a [`GbnReceiver`] over an impaired channel.
//!
//! The receiver is purely reactive.  Every datagram from the sender is decoded
//! and fed to the state machine, and whatever acknowledgement it asks for is
//! sent straight back to the datagram's source.  Once the FIN is accepted the
//! session lingers for `config.linger`, re-acknowledging duplicates so a
//! sender whose FIN-ACK was lost can still close cleanly.
//!
//! The first valid frame locks the session onto its source address; datagrams
//! from anyone else are ignored from then on.  Once data has been accepted,
//! a peer that stays silent for `config.idle_timeout` aborts the session with
//! [`TransferError::PeerSilent`].

use std::net::SocketAddr;

use tokio::time::Instant;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransportError};
use crate::events::{DiscardReason, EventSink, LogSink, TransferEvent, TransferStats};
use crate::gbn_receiver::{GbnReceiver, Verdict};
use crate::packet::{Frame, FrameType};
use crate::simulator::ImpairedChannel;
use crate::socket::Transport;
use crate::state::ReceiverState;

/// Result of a completed inbound transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Every accepted payload, concatenated in sequence order.
    pub data: Vec<u8>,
    pub stats: TransferStats,
}

/// One inbound transfer session.
pub struct Receiver<T> {
    channel: ImpairedChannel<T>,
    config: TransferConfig,
    gbn: GbnReceiver,
    state: ReceiverState,
    peer: Option<SocketAddr>,
    stats: TransferStats,
    sink: Box<dyn EventSink>,
}

impl<T: Transport> Receiver<T> {
    pub fn new(channel: ImpairedChannel<T>, config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            channel,
            config,
            gbn: GbnReceiver::new(),
            state: ReceiverState::default(),
            peer: None,
            stats: TransferStats::default(),
            sink: Box::new(LogSink::new("gbn:recv")),
        })
    }

    /// Replace the default logging sink.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Next sequence number the session will accept.
    pub fn expected(&self) -> u32 {
        self.gbn.expected()
    }

    /// Payload accepted so far.
    pub fn received(&self) -> &[u8] {
        self.gbn.output()
    }

    /// Source the session locked onto, once the first valid frame arrived.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    /// Receive until the sender's FIN is accepted, linger, and hand back the
    /// reassembled data.
    pub async fn run(&mut self) -> Result<Delivery, TransferError> {
        let started = Instant::now();
        let result = self.receive().await;

        match result {
            Ok(()) => {
                self.stats.elapsed = started.elapsed();
                self.state = ReceiverState::Lingering;
                self.linger().await;
                self.state = ReceiverState::Done;
                self.sink.on_event(&TransferEvent::Completed {
                    bytes: self.stats.bytes,
                });
                let data = std::mem::take(&mut self.gbn).into_output();
                Ok(Delivery {
                    data,
                    stats: self.stats.clone(),
                })
            }
            Err(e) => {
                self.stats.elapsed = started.elapsed();
                self.state = ReceiverState::Aborted;
                log::warn!("[gbn:recv] aborted at expected={}: {e}", self.gbn.expected());
                Err(e)
            }
        }
    }

    async fn receive(&mut self) -> Result<(), TransferError> {
        // Time of the last valid frame from the peer, once data was accepted.
        let mut last_heard: Option<Instant> = None;
        while !self.gbn.is_finished() {
            let wait = match (self.config.idle_timeout, last_heard) {
                (Some(idle), Some(at)) => {
                    let left = (at + idle).saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(TransferError::PeerSilent(idle));
                    }
                    left.min(self.config.poll_interval)
                }
                _ => self.config.poll_interval,
            };
            if let Some((bytes, from)) = self.channel.recv(wait).await? {
                let valid = self.on_datagram(&bytes, from).await?;
                if valid && self.gbn.last_accepted().is_some() {
                    last_heard = Some(Instant::now());
                }
            }
        }
        Ok(())
    }

    /// Keep answering retransmitted FINs and stray data until the linger
    /// period runs out or the link goes away.
    async fn linger(&mut self) {
        let deadline = Instant::now() + self.config.linger;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                break;
            }
            match self.channel.recv(wait).await {
                Ok(Some((bytes, from))) => {
                    if let Err(e) = self.on_datagram(&bytes, from).await {
                        log::debug!("[gbn:recv] linger ended: {e}");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::debug!("[gbn:recv] linger ended: {e}");
                    break;
                }
            }
        }
    }

    /// Handle one datagram; `true` when it was a valid frame from the peer.
    async fn on_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Result<bool, TransportError> {
        if self.peer.is_some_and(|p| p != from) {
            log::trace!("[gbn:recv] ignoring datagram from stranger {from}");
            return Ok(false);
        }

        let (verdict, valid) = match Frame::decode(bytes) {
            Ok(frame) => {
                self.peer.get_or_insert(from);
                let verdict = self.gbn.on_frame(&frame);
                self.record(&frame, &verdict);
                (verdict, true)
            }
            Err(e) => {
                log::trace!("[gbn:recv] corrupt datagram from {from}: {e}");
                self.stats.corrupt_frames += 1;
                self.sink.on_event(&TransferEvent::Discarded {
                    seq: None,
                    reason: DiscardReason::Corrupt,
                });
                (self.gbn.on_corrupt(), false)
            }
        };

        if let Some(ack) = verdict.ack() {
            self.channel.send(&Frame::ack(ack).encode(), from).await?;
            self.stats.acks_sent += 1;
            self.sink.on_event(&TransferEvent::FrameSent {
                kind: FrameType::Ack,
                seq: ack,
                len: 0,
                retransmission: matches!(verdict, Verdict::Rejected { .. }),
            });
        }
        Ok(valid)
    }

    fn record(&mut self, frame: &Frame, verdict: &Verdict) {
        match *verdict {
            Verdict::Accepted { ack, len } => {
                self.stats.bytes += len as u64;
                self.stats.frames_originated += 1;
                self.sink
                    .on_event(&TransferEvent::Accepted { seq: ack, len });
            }
            Verdict::Finished { ack } => {
                log::debug!("[gbn:recv] ← FIN seq={ack}, transfer complete");
            }
            Verdict::Rejected { .. } => {
                let reason = if frame.kind == FrameType::Ack {
                    DiscardReason::Unexpected
                } else {
                    self.stats.out_of_order_frames += 1;
                    DiscardReason::OutOfOrder
                };
                self.sink.on_event(&TransferEvent::Discarded {
                    seq: Some(frame.seq),
                    reason,
                });
            }
        }
    }
}
