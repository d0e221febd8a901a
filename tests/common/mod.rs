//! Shared fixtures for the integration tests: scripted impairment, an event
//! recorder, and helpers that wire a sender and receiver over an in-process
//! link.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdt_over_udp::events::{EventSink, TransferEvent, TransferStats};
use rdt_over_udp::memory::MemoryTransport;
use rdt_over_udp::packet::{Frame, FrameType, HEADER_LEN};
use rdt_over_udp::simulator::{ImpairedChannel, ImpairmentPolicy, NoImpairment};
use rdt_over_udp::{Delivery, Receiver, Sender, TimeoutPolicy, TransferConfig, Transport};

// ---------------------------------------------------------------------------
// Scripted impairment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Action {
    Drop,
    /// Flip this bit of the payload.
    CorruptPayloadBit(usize),
    /// Flip this bit of the whole encoded frame, header included.
    CorruptBit(usize),
}

#[derive(Debug, Clone)]
struct Rule {
    kind: FrameType,
    /// `None` matches every sequence number.
    seq: Option<u32>,
    action: Action,
    remaining: u32,
}

/// Impairs exactly the frames it is told to, a fixed number of times each.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    rules: Vec<Rule>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, kind: FrameType, seq: Option<u32>, action: Action, remaining: u32) -> Self {
        self.rules.push(Rule {
            kind,
            seq,
            action,
            remaining,
        });
        self
    }

    pub fn drop_once(self, kind: FrameType, seq: u32) -> Self {
        self.rule(kind, Some(seq), Action::Drop, 1)
    }

    /// Drop every frame of `kind`, whatever its sequence number.
    pub fn drop_all(self, kind: FrameType) -> Self {
        self.rule(kind, None, Action::Drop, u32::MAX)
    }

    pub fn corrupt_once(self, kind: FrameType, seq: u32, payload_bit: usize) -> Self {
        self.rule(kind, Some(seq), Action::CorruptPayloadBit(payload_bit), 1)
    }

    /// Flip `bit` of the encoded frame; reaches header-only frames like ACKs.
    pub fn corrupt_frame_once(self, kind: FrameType, seq: u32, bit: usize) -> Self {
        self.rule(kind, Some(seq), Action::CorruptBit(bit), 1)
    }

    fn take(&mut self, frame: &[u8], want_drop: bool) -> Option<Action> {
        let decoded = Frame::decode(frame).ok()?;
        let rule = self.rules.iter_mut().find(|r| {
            r.remaining > 0
                && r.kind == decoded.kind
                && r.seq.map_or(true, |s| s == decoded.seq)
                && matches!(r.action, Action::Drop) == want_drop
        })?;
        rule.remaining -= 1;
        Some(rule.action)
    }
}

impl ImpairmentPolicy for Scripted {
    fn drop_frame(&mut self, frame: &[u8]) -> bool {
        self.take(frame, true).is_some()
    }

    fn corrupt_bit(&mut self, frame: &[u8]) -> Option<usize> {
        match self.take(frame, false)? {
            Action::CorruptPayloadBit(bit) => Some(HEADER_LEN * 8 + bit),
            Action::CorruptBit(bit) => Some(bit),
            Action::Drop => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Event recorder
// ---------------------------------------------------------------------------

/// Sink that keeps every event; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<TransferEvent>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<TransferEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Sequence numbers of DATA frames sent, split by first send / resend.
    pub fn data_sent(&self, retransmission: bool) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::FrameSent {
                    kind: FrameType::Data,
                    seq,
                    retransmission: r,
                    ..
                } if r == retransmission => Some(seq),
                _ => None,
            })
            .collect()
    }

    /// Sequence numbers of every ACK sent.
    pub fn acks_sent(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::FrameSent {
                    kind: FrameType::Ack,
                    seq,
                    ..
                } => Some(seq),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&TransferEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for Recorder {
    fn on_event(&mut self, event: &TransferEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Session wiring
// ---------------------------------------------------------------------------

/// Fixed 50 ms timeout: deterministic under a paused clock.
pub fn fixed_config(window: usize) -> TransferConfig {
    TransferConfig::go_back_n(window).with_timeout(TimeoutPolicy::Fixed(Duration::from_millis(50)))
}

pub struct Link {
    pub sender: Sender<MemoryTransport>,
    pub receiver: Receiver<MemoryTransport>,
    pub sender_log: Recorder,
    pub receiver_log: Recorder,
}

/// Sender and receiver over a fresh in-process pair, each side's outbound
/// traffic impaired by its own policy.
pub fn link(
    config: TransferConfig,
    sender_policy: impl ImpairmentPolicy + 'static,
    receiver_policy: impl ImpairmentPolicy + 'static,
) -> Link {
    let (a, b) = MemoryTransport::pair();
    let peer = b.local_addr();
    let sender_log = Recorder::default();
    let receiver_log = Recorder::default();

    let sender = Sender::new(ImpairedChannel::with_policy(a, sender_policy), peer, config.clone())
        .expect("sender config")
        .with_sink(sender_log.clone());
    let receiver = Receiver::new(ImpairedChannel::with_policy(b, receiver_policy), config)
        .expect("receiver config")
        .with_sink(receiver_log.clone());

    Link {
        sender,
        receiver,
        sender_log,
        receiver_log,
    }
}

pub fn clean_link(config: TransferConfig) -> Link {
    link(config, NoImpairment, NoImpairment)
}

/// Run both ends to completion and return `(sender stats, delivery)`.
pub async fn transfer(
    sender: &mut Sender<MemoryTransport>,
    receiver: Receiver<MemoryTransport>,
    chunks: Vec<Vec<u8>>,
) -> (TransferStats, Delivery) {
    let (sent, received) = tokio::join!(sender.send_chunks(chunks), async move {
        let mut receiver = receiver;
        receiver.run().await
    });
    (sent.expect("sender failed"), received.expect("receiver failed"))
}

/// `n` chunks of `len` bytes, each chunk filled with a distinct byte.
pub fn chunks(n: usize, len: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| vec![b'a' + (i % 26) as u8; len]).collect()
}
