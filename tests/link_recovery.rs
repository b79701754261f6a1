//! Failure and contention scenarios: sequence gaps, stale sessions, bus
//! arbitration against remote transfers, retry exhaustion, and the service
//! loops.

mod helpers;

use std::time::Duration;

use helpers::{drain_sent, inject, MockTransceiver, SharedBus, TokioTimer};

use j1939_link::error::SendError;
use j1939_link::protocol::datalink::arbiter::BusArbiter;
use j1939_link::protocol::datalink::receiver::{Receiver, RxTrigger};
use j1939_link::protocol::datalink::sender::{OutboundQueue, OutboundRequest, Sender};
use j1939_link::protocol::datalink::sink::JsonLineSink;
use j1939_link::protocol::datalink::{LinkConfig, PGN_EXTRA};
use j1939_link::protocol::transport::can_frame::CanFrame;
use j1939_link::protocol::transport::can_id::CAN_EFF_FLAG;

type TestReceiver<'a> = Receiver<'a, MockTransceiver, TokioTimer, JsonLineSink<String>>;

fn make_receiver<'a>(bus: &'a SharedBus, arbiter: &'a BusArbiter) -> TestReceiver<'a> {
    Receiver::new(
        bus,
        arbiter,
        TokioTimer::new(),
        JsonLineSink::new(String::new()),
        LinkConfig::default(),
    )
}

fn make_sender<'a>(bus: &'a SharedBus, arbiter: &'a BusArbiter) -> Sender<'a, MockTransceiver, TokioTimer> {
    Sender::new(bus, arbiter, TokioTimer::new(), LinkConfig::default())
}

/// Remote announce: `size` bytes in `packets` packets from `src`.
fn remote_announce(src: u8, tag: u8, size: u16, packets: u8, pgn: u32) -> CanFrame {
    let [lo, hi] = size.to_le_bytes();
    CanFrame {
        can_id: 0x18EC_FF00 | src as u32 | CAN_EFF_FLAG,
        dlc: 8,
        data: [
            0x20 | (tag << 4),
            lo,
            hi,
            packets,
            0xFF,
            (pgn & 0xFF) as u8,
            ((pgn >> 8) & 0xFF) as u8,
            ((pgn >> 16) & 0xFF) as u8,
        ],
    }
}

fn remote_dt(src: u8, tag: u8, seq: u8, chunk: &[u8]) -> CanFrame {
    let mut data = [0xFF; 8];
    data[0] = (tag << 4) | seq;
    data[1..1 + chunk.len()].copy_from_slice(chunk);
    CanFrame {
        can_id: 0x18EB_FF00 | src as u32 | CAN_EFF_FLAG,
        dlc: 8,
        data,
    }
}

#[tokio::test(start_paused = true)]
/// Scenario: a skipped sequence destroys the session; nothing is emitted and
/// the bus claim is dropped.
async fn test_out_of_order_aborts_session() {
    let bus = SharedBus::new(MockTransceiver::new());
    let arbiter = BusArbiter::new(2000);
    let mut rx = make_receiver(&bus, &arbiter);

    rx.decode(&remote_announce(0x48, 2, 30, 5, PGN_EXTRA));
    rx.decode(&remote_dt(0x48, 2, 1, &[1, 2, 3, 4, 5, 6, 7]));
    rx.decode(&remote_dt(0x48, 2, 3, &[8, 9, 10, 11, 12, 13, 14]));

    assert!(rx.sink().inner().is_empty());
    assert!(rx.sessions().is_empty());
    assert!(arbiter.is_available(0));
}

#[tokio::test(start_paused = true)]
/// Scenario: an announced transfer that goes silent is reaped after a
/// second; the same key is then free for a new announce.
async fn test_stale_session_eviction() {
    let bus = SharedBus::new(MockTransceiver::new());
    let arbiter = BusArbiter::new(2000);
    let mut rx = make_receiver(&bus, &arbiter);

    rx.decode(&remote_announce(0x48, 2, 21, 3, PGN_EXTRA));
    assert_eq!(rx.sessions().len(), 1);

    tokio::time::advance(Duration::from_millis(1100)).await;
    rx.sweep();

    assert!(rx.sessions().is_empty());

    // The key is free again: a fresh announce opens cleanly.
    rx.decode(&remote_announce(0x48, 2, 70, 10, PGN_EXTRA));
    assert_eq!(rx.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
/// Scenario: while a remote BAM is mid-flight our transmit is denied; once
/// the remote completes the retry goes through.
async fn test_bus_contention_with_remote_bam() {
    let bus = SharedBus::new(MockTransceiver::new());
    let arbiter = BusArbiter::new(2000);
    let mut rx = make_receiver(&bus, &arbiter);
    let mut tx = make_sender(&bus, &arbiter);

    // Remote announce: 30 bytes in 5 packets, bus held for 5*200+500 ms.
    rx.decode(&remote_announce(0x48, 2, 30, 5, PGN_EXTRA));

    // The back-off window (5 x 100 ms) ends before the remote's hold does.
    let denied = tx.send_single_frame(PGN_EXTRA, 0xFF, &[0x01]).await;
    assert!(matches!(denied, Err(SendError::BusBusy)));
    assert!(drain_sent(&bus).await.is_empty());

    // Remote transfer completes; its bus claim is released.
    let payload: Vec<u8> = (0..30u8).collect();
    for (i, chunk) in payload.chunks(7).enumerate() {
        rx.decode(&remote_dt(0x48, 2, i as u8 + 1, chunk));
    }
    assert!(!rx.sink().inner().is_empty());

    tx.send_single_frame(PGN_EXTRA, 0xFF, &[0x01])
        .await
        .expect("bus is free after the remote completed");
    assert_eq!(drain_sent(&bus).await.len(), 1);
}

#[tokio::test(start_paused = true)]
/// Scenario: a remote holder that never finishes is overridden by the
/// watchdog deadline.
async fn test_watchdog_frees_abandoned_bus() {
    let bus = SharedBus::new(MockTransceiver::new());
    let arbiter = BusArbiter::new(2000);
    let mut rx = make_receiver(&bus, &arbiter);
    let mut tx = make_sender(&bus, &arbiter);

    rx.decode(&remote_announce(0x48, 2, 30, 5, PGN_EXTRA));

    // Past the 5*200+500 ms hold window: the arbiter self-heals.
    tokio::time::advance(Duration::from_millis(1600)).await;

    tx.send_single_frame(PGN_EXTRA, 0xFF, &[0x01])
        .await
        .expect("watchdog released the abandoned claim");
    assert_eq!(drain_sent(&bus).await.len(), 1);
}

#[tokio::test(start_paused = true)]
/// A frame failing more often than the retry budget aborts the burst; a
/// single hiccup is retried through.
async fn test_transmit_retry_budget() {
    let bus = SharedBus::new(MockTransceiver::new());
    let arbiter = BusArbiter::new(2000);
    let mut tx = make_sender(&bus, &arbiter);
    let payload = [0xAA; 21];

    // Three consecutive failures exhaust the per-frame budget.
    bus.lock().await.fail_next_sends = 3;
    let aborted = tx.send_multi_frame(PGN_EXTRA, &payload).await;
    assert!(matches!(aborted, Err(SendError::Transmit(()))));
    assert!(drain_sent(&bus).await.is_empty());

    // One failure is absorbed by the retry ladder.
    bus.lock().await.fail_next_sends = 1;
    tx.send_multi_frame(PGN_EXTRA, &payload)
        .await
        .expect("one hiccup is retried through");
    // Announce + 3 data frames made it to the wire.
    assert_eq!(drain_sent(&bus).await.len(), 4);
}

#[tokio::test(start_paused = true)]
/// The transmit service loop routes queued requests on size and keeps
/// draining the queue.
async fn test_sender_service_loop() {
    let bus = SharedBus::new(MockTransceiver::new());
    let arbiter = BusArbiter::new(2000);
    let mut tx = make_sender(&bus, &arbiter);

    let queue: OutboundQueue<4> = OutboundQueue::new();
    queue
        .send(OutboundRequest::new(PGN_EXTRA, &[0x01, 0x02]).expect("valid request"))
        .await;
    queue
        .send(OutboundRequest::new(PGN_EXTRA, &[0x55; 21]).expect("valid request"))
        .await;

    tokio::select! {
        _ = tx.run(&queue) => unreachable!("the service loop never returns"),
        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
    }

    let frames = drain_sent(&bus).await;
    // One single frame, then announce + 3 data frames.
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0].dlc, 2);
    assert_eq!(frames[1].can_id & 0x1FFF_FFFF, 0x18ECFF32);
}

#[tokio::test(start_paused = true)]
/// The receive service loop wakes on the interrupt trigger, drains the
/// hardware, and delivers the reassembled record.
async fn test_receiver_service_loop() {
    let bus = SharedBus::new(MockTransceiver::new());
    let arbiter = BusArbiter::new(2000);
    let mut rx = make_receiver(&bus, &arbiter);
    let trigger = RxTrigger::new();

    let payload: [u8; 21] = *b"Hello, J1939 world!!!";
    let mut frames = vec![remote_announce(0x48, 2, 21, 3, PGN_EXTRA)];
    for (i, chunk) in payload.chunks(7).enumerate() {
        frames.push(remote_dt(0x48, 2, i as u8 + 1, chunk));
    }
    inject(&bus, &frames).await;
    trigger.notify();

    tokio::select! {
        _ = rx.run(&trigger) => unreachable!("the service loop never returns"),
        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
    }

    assert!(rx
        .sink()
        .inner()
        .contains(&format!("\"size\":{}", payload.len())));
    assert!(rx.sessions().is_empty());
}

#[tokio::test(start_paused = true)]
/// Oversized or empty queue requests are refused at construction.
async fn test_outbound_request_bounds() {
    assert!(OutboundRequest::new(PGN_EXTRA, &[]).is_none());
    assert!(OutboundRequest::new(PGN_EXTRA, &[0; 1786]).is_none());
    let request = OutboundRequest::new(PGN_EXTRA, &[0; 1785]).expect("maximum payload fits");
    assert_eq!(request.payload().len(), 1785);
    assert_eq!(request.pgn(), PGN_EXTRA);
}
