//! End-to-end transfers over in-process links with scripted and random
//! impairment.
//!
//! Every test runs on a paused tokio clock, so retransmission timeouts fire
//! instantly and the event sequences are deterministic.

mod common;

use std::time::Duration;

use common::{chunks, clean_link, fixed_config, link, transfer, Scripted};
use rdt_over_udp::events::{DiscardReason, TransferEvent};
use rdt_over_udp::packet::FrameType;
use rdt_over_udp::simulator::{ImpairmentConfig, NoImpairment, RandomImpairment};
use rdt_over_udp::state::{ReceiverState, SenderState};
use rdt_over_udp::{TimeoutPolicy, TransferConfig};

// ---------------------------------------------------------------------------
// Test 1: lossless stop-and-wait
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_lossless_stop_and_wait() {
    let mut l = clean_link(fixed_config(1));
    let data = chunks(3, 10);
    let (stats, delivery) = transfer(&mut l.sender, l.receiver, data.clone()).await;

    assert_eq!(delivery.data, data.concat());
    assert_eq!(l.sender_log.data_sent(false), vec![0, 1, 2]);
    assert!(l.sender_log.data_sent(true).is_empty());
    assert_eq!(l.receiver_log.acks_sent(), vec![0, 1, 2, 3], "three DATA ACKs then the FIN's");

    // Strict alternation: every send is answered before the next one.
    let order: Vec<_> = l
        .sender_log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TransferEvent::FrameSent { kind: FrameType::Data, seq, .. } => Some(('S', seq)),
            TransferEvent::AckReceived { seq, .. } => Some(('A', seq)),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![('S', 0), ('A', 0), ('S', 1), ('A', 1), ('S', 2), ('A', 2)]);

    assert_eq!(stats.frames_sent, 3);
    assert_eq!(stats.retransmissions, 0);
    assert_eq!(stats.timeouts, 0);
    assert_eq!(stats.bytes, 30);
    assert_eq!(stats.ack_efficiency(), 1.0);
    assert_eq!(l.sender.state(), SenderState::Done);
}

// ---------------------------------------------------------------------------
// Test 2: Go-Back-N, one data frame lost mid-window
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_gbn_loss_retransmits_from_gap() {
    let mut l = link(
        fixed_config(4),
        Scripted::new().drop_once(FrameType::Data, 2),
        NoImpairment,
    );
    let data = chunks(6, 100);
    let (stats, delivery) = transfer(&mut l.sender, l.receiver, data.clone()).await;

    assert_eq!(delivery.data, data.concat(), "no gaps, no duplication");
    assert_eq!(l.sender_log.data_sent(false), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(l.sender_log.data_sent(true), vec![2, 3, 4, 5], "go back to the gap");
    assert_eq!(
        l.sender_log.count(|e| matches!(e, TransferEvent::Timeout { base: 2, .. })),
        1
    );
    assert_eq!(stats.timeouts, 1);

    // Frames 3..5 arrived out of order the first time and were answered with
    // the last in-order ACK.
    assert_eq!(delivery.stats.out_of_order_frames, 3);
    let acks = l.receiver_log.acks_sent();
    assert_eq!(&acks[..5], &[0, 1, 1, 1, 1]);
}

// ---------------------------------------------------------------------------
// Test 3: corrupted data frame, stop-and-wait
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_corrupt_data_is_discarded_and_resent() {
    let mut l = link(
        fixed_config(1),
        Scripted::new().corrupt_once(FrameType::Data, 1, 3),
        NoImpairment,
    );
    let data = chunks(3, 10);
    let (stats, delivery) = transfer(&mut l.sender, l.receiver, data.clone()).await;

    assert_eq!(delivery.data, data.concat());
    assert_eq!(delivery.stats.corrupt_frames, 1);
    assert_eq!(
        l.receiver_log.count(|e| matches!(
            e,
            TransferEvent::Discarded { seq: None, reason: DiscardReason::Corrupt }
        )),
        1
    );
    // The corrupt frame is answered with a repeat of the previous ACK.
    assert_eq!(l.receiver_log.acks_sent(), vec![0, 0, 1, 2, 3]);

    assert_eq!(l.sender_log.data_sent(true), vec![1], "the same frame is resent");
    assert_eq!(stats.duplicate_acks, 1);
    assert_eq!(stats.retransmissions, 1);
}

// ---------------------------------------------------------------------------
// Test 4: lost ACK produces a duplicate ACK without a double advance
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_lost_ack_advances_base_once() {
    let mut l = link(
        fixed_config(1),
        NoImpairment,
        Scripted::new().drop_once(FrameType::Ack, 0),
    );
    let data = chunks(2, 10);
    let (stats, delivery) = transfer(&mut l.sender, l.receiver, data.clone()).await;

    assert_eq!(delivery.data, data.concat());
    assert_eq!(&l.receiver_log.acks_sent()[..2], &[0, 0], "ACK 0 emitted twice");
    assert_eq!(delivery.stats.out_of_order_frames, 1, "resent frame 0 is a duplicate");

    let advances: Vec<_> = l
        .sender_log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TransferEvent::AckReceived { seq, base } => Some((seq, base)),
            _ => None,
        })
        .collect();
    assert_eq!(advances, vec![(0, 1), (1, 2)]);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(l.sender.window().base(), 2);
}

// ---------------------------------------------------------------------------
// Test 5: stale duplicate ACKs in a pipelined window change nothing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_duplicate_acks_do_not_move_base() {
    let mut l = link(
        fixed_config(4),
        Scripted::new().drop_once(FrameType::Data, 1),
        NoImpairment,
    );
    let data = chunks(4, 8);
    let (stats, delivery) = transfer(&mut l.sender, l.receiver, data.clone()).await;

    assert_eq!(delivery.data, data.concat());
    // Frames 2 and 3 each drew a repeat of ACK 0.
    assert_eq!(stats.duplicate_acks, 2);
    let bases: Vec<u32> = l
        .sender_log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TransferEvent::AckReceived { base, .. } => Some(base),
            _ => None,
        })
        .collect();
    assert!(bases.windows(2).all(|w| w[0] < w[1]), "base strictly increases: {bases:?}");
    assert_eq!(bases.last(), Some(&4));
}

// ---------------------------------------------------------------------------
// Test 6: byte-exact delivery across window sizes and payload shapes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_round_trip_across_windows() {
    let payloads: Vec<Vec<u8>> = [0usize, 1, 1023, 1024, 1025, 10_000]
        .iter()
        .map(|&n| (0..n).map(|i| (i * 7 % 256) as u8).collect())
        .collect();

    for window in [1, 2, 4, 8, 16] {
        for payload in &payloads {
            let l = clean_link(fixed_config(window));
            let mut sender = l.sender;
            let receiver = l.receiver;
            let (sent, received) = tokio::join!(sender.send(payload), async move {
                let mut receiver = receiver;
                receiver.run().await
            });
            let stats = sent.unwrap();
            let delivery = received.unwrap();
            assert_eq!(&delivery.data, payload, "window {window}, {} bytes", payload.len());
            assert_eq!(stats.bytes, payload.len() as u64);
            assert_eq!(stats.frames_sent, payload.len().div_ceil(1024) as u64);
        }
    }
}

// ---------------------------------------------------------------------------
// Test 7: heavy random impairment in both directions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_survives_heavy_impairment() {
    for seed in [1u64, 2, 3] {
        let impaired = |seed| {
            RandomImpairment::new(ImpairmentConfig {
                loss_rate: 0.2,
                bit_error_rate: 0.1,
                seed,
            })
        };
        let mut l = link(
            fixed_config(8).with_packet_size(256),
            impaired(seed),
            impaired(seed + 100),
        );
        let data: Vec<Vec<u8>> = (0..80u32).map(|i| i.to_be_bytes().repeat(64)).collect();
        let (stats, delivery) = transfer(&mut l.sender, l.receiver, data.clone()).await;

        assert_eq!(delivery.data, data.concat(), "seed {seed}");
        assert!(stats.retransmissions > 0);
        assert!(stats.ack_efficiency() < 1.0);
    }
}

// ---------------------------------------------------------------------------
// Test 8: the window bound holds at every send
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_window_bound_observed_in_events() {
    const N: u32 = 5;
    let mut l = link(
        fixed_config(N as usize).with_packet_size(64),
        RandomImpairment::new(ImpairmentConfig::lossy(0.25, 9)),
        RandomImpairment::new(ImpairmentConfig::lossy(0.1, 10)),
    );
    let data = chunks(60, 64);
    transfer(&mut l.sender, l.receiver, data).await;

    let mut base = 0;
    let mut next = 0;
    for event in l.sender_log.events() {
        match event {
            TransferEvent::AckReceived { base: b, .. } => {
                assert!(b > base);
                base = b;
            }
            TransferEvent::FrameSent {
                kind: FrameType::Data,
                seq,
                retransmission,
                ..
            } => {
                assert!(seq >= base && seq < base + N, "seq {seq} outside [{base}, {base}+{N})");
                if !retransmission {
                    assert_eq!(seq, next, "sequence numbers are assigned in order");
                    next += 1;
                }
            }
            _ => {}
        }
    }
    assert_eq!(next, 60);
}

// ---------------------------------------------------------------------------
// Test 9: adaptive timeout tracks the (instant) RTT of an in-process link
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_adaptive_timeout_converges_to_floor() {
    let config = TransferConfig::go_back_n(2).with_timeout(TimeoutPolicy::Adaptive {
        initial: Duration::from_millis(200),
        min: Duration::from_millis(10),
        max: Duration::from_secs(2),
    });
    let mut l = clean_link(config);
    transfer(&mut l.sender, l.receiver, chunks(200, 16)).await;
    assert_eq!(l.sender.rto(), Duration::from_millis(10));
}

// ---------------------------------------------------------------------------
// Test 10: lifecycle states at the end of a session
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_states_after_completion() {
    let l = clean_link(fixed_config(3));
    let mut sender = l.sender;
    let mut receiver = l.receiver;
    assert_eq!(receiver.state(), ReceiverState::Receiving);

    let (sent, received) = tokio::join!(sender.send(b"state machine"), receiver.run());
    sent.unwrap();
    assert_eq!(received.unwrap().data, b"state machine");
    assert_eq!(sender.state(), SenderState::Done);
    assert_eq!(receiver.state(), ReceiverState::Done);
}

// ---------------------------------------------------------------------------
// Test 11: a corrupted ACK changes nothing; the timer recovers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_corrupt_ack_leaves_base_alone() {
    let mut l = link(
        fixed_config(1),
        NoImpairment,
        // Bit 5 of the first header byte: inside the sequence number.
        Scripted::new().corrupt_frame_once(FrameType::Ack, 0, 5),
    );
    let data = chunks(2, 10);
    let (stats, delivery) = transfer(&mut l.sender, l.receiver, data.clone()).await;

    assert_eq!(delivery.data, data.concat());

    let events = l.sender_log.events();
    let timeout_at = events
        .iter()
        .position(|e| matches!(e, TransferEvent::Timeout { base: 0, outstanding: 1 }))
        .expect("frame 0 times out");
    assert!(
        events[..timeout_at]
            .iter()
            .all(|e| !matches!(e, TransferEvent::AckReceived { .. })),
        "base moved before the timeout: {events:?}"
    );
    assert!(events[..timeout_at].contains(&TransferEvent::Discarded {
        seq: None,
        reason: DiscardReason::Corrupt,
    }));

    assert_eq!(l.sender_log.data_sent(true), vec![0]);
    assert_eq!(&l.receiver_log.acks_sent()[..2], &[0, 0], "resent frame 0 is re-ACKed");
    assert_eq!(stats.corrupt_frames, 1);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.duplicate_acks, 0);
}

// ---------------------------------------------------------------------------
// Test 12: every FIN lost; both ends still finish
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_lost_fins_end_both_sides() {
    let config = fixed_config(1).with_idle_timeout(Some(Duration::from_secs(2)));
    let fin_retries = config.fin_retries as usize;
    let l = link(config, Scripted::new().drop_all(FrameType::Fin), NoImpairment);
    let mut sender = l.sender;
    let mut receiver = l.receiver;
    let data = chunks(3, 10);

    let (sent, received) = tokio::join!(sender.send_chunks(data.clone()), receiver.run());

    // Every data byte was acknowledged, so the sender completes after its
    // FIN retries run out.
    assert_eq!(sent.unwrap().bytes, 30);
    assert_eq!(sender.state(), SenderState::Done);
    assert_eq!(
        l.sender_log.count(|e| matches!(e, TransferEvent::FrameSent { kind: FrameType::Fin, .. })),
        fin_retries
    );

    // The receiver hears nothing more and gives up instead of waiting forever.
    assert!(matches!(
        received,
        Err(rdt_over_udp::TransferError::PeerSilent(d)) if d == Duration::from_secs(2)
    ));
    assert_eq!(receiver.state(), ReceiverState::Aborted);
    assert_eq!(receiver.received(), &data.concat()[..]);
    assert_eq!(receiver.expected(), 3);
}
