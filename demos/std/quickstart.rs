//! # Quickstart Example
//!
//! Minimal walkthrough of the J1939 link engine on a loopback transceiver:
//! - Build and decompose a 29-bit identifier
//! - Send a single-frame message and decode it
//! - Send a multi-frame BAM burst and watch it reassemble
//!
//! This example uses `std` and tokio for a quick trial run; on hardware the
//! same traits are implemented over the SPI CAN controller and the RTOS
//! timer.
//!
//! ```bash
//! cargo run --example quickstart
//! ```

use std::collections::VecDeque;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

use j1939_link::protocol::datalink::arbiter::BusArbiter;
use j1939_link::protocol::datalink::receiver::Receiver;
use j1939_link::protocol::datalink::sender::Sender;
use j1939_link::protocol::datalink::sink::JsonLineSink;
use j1939_link::protocol::datalink::{pgn_name, LinkConfig, BROADCAST_ADDRESS, PGN_EXTRA};
use j1939_link::protocol::transport::can_frame::CanFrame;
use j1939_link::protocol::transport::can_id::CanId;
use j1939_link::protocol::transport::traits::link_timer::LinkTimer;
use j1939_link::protocol::transport::traits::transceiver::CanTransceiver;

// ============================================================================
// Loopback transceiver: sent frames are simply kept for later replay
// ============================================================================

struct LoopbackTransceiver {
    inbound: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
}

impl LoopbackTransceiver {
    fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: Vec::new(),
        }
    }
}

impl CanTransceiver for LoopbackTransceiver {
    type Error = ();

    async fn reset(&mut self) -> Result<(), ()> {
        Ok(())
    }

    async fn set_bitrate(&mut self, _bitrate_kbps: u16) -> Result<(), ()> {
        Ok(())
    }

    async fn set_normal_mode(&mut self) -> Result<(), ()> {
        Ok(())
    }

    async fn check_receive(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    async fn read_frame(&mut self) -> Result<CanFrame, ()> {
        self.inbound.pop_front().ok_or(())
    }

    async fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ()> {
        self.sent.push(*frame);
        Ok(())
    }

    async fn clear_rx_interrupt(&mut self) {}
}

// ============================================================================
// Timer implementation over tokio
// ============================================================================

struct TokioTimer {
    start: tokio::time::Instant,
}

impl LinkTimer for TokioTimer {
    async fn delay_ms(&mut self, millis: u32) {
        tokio::time::sleep(std::time::Duration::from_millis(millis as u64)).await;
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

fn timer() -> TokioTimer {
    TokioTimer {
        start: tokio::time::Instant::now(),
    }
}

// ============================================================================
// Main walkthrough
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== j1939-link Quickstart ===\n");

    // ======================================================================
    // 1. Build and decompose a CAN identifier
    // ======================================================================
    println!("1. Building a CAN ID");

    let can_id = CanId::builder(PGN_EXTRA, 0x32)
        .to_destination(BROADCAST_ADDRESS)
        .build()
        .expect("valid CAN ID");

    println!("   CAN ID: 0x{:08X}", can_id.0);
    println!("   Priority: {}", can_id.priority());
    println!("   PGN: 0x{:05X} ({})", can_id.pgn(), pgn_name(PGN_EXTRA));
    println!("   Source: 0x{:02X}\n", can_id.source_address());

    // ======================================================================
    // 2. Bring up a loopback link
    // ======================================================================
    println!("2. Bringing up the loopback link");

    let bus: Mutex<CriticalSectionRawMutex, _> = Mutex::new(LoopbackTransceiver::new());
    {
        // The usual hardware bring-up sequence, harmless on the loopback.
        let mut hw = bus.lock().await;
        hw.reset().await.expect("reset");
        hw.set_bitrate(500).await.expect("bitrate");
        hw.set_normal_mode().await.expect("normal mode");
    }

    let arbiter = BusArbiter::new(2000);
    let mut tx = Sender::new(&bus, &arbiter, timer(), LinkConfig::default());
    let mut rx = Receiver::new(
        &bus,
        &arbiter,
        timer(),
        JsonLineSink::new(String::new()),
        LinkConfig::default(),
    );

    println!("   Transceiver in normal mode @ 500 kbit/s\n");

    // ======================================================================
    // 3. Single-frame message
    // ======================================================================
    println!("3. Sending a single frame");

    tx.send_single_frame(PGN_EXTRA, BROADCAST_ADDRESS, b"ABC")
        .await
        .expect("single frame send");

    let frames: Vec<CanFrame> = bus.lock().await.sent.drain(..).collect();
    println!("   Frames on the wire: {}", frames.len());
    for frame in &frames {
        rx.decode(frame);
    }
    print!("   Decoded record: {}", rx.sink().inner());
    println!();

    // ======================================================================
    // 4. Multi-frame BAM transfer
    // ======================================================================
    println!("4. Sending a 21-byte BAM transfer");

    let payload: [u8; 21] = *b"Hello, J1939 world!!!";
    tx.send_multi_frame(PGN_EXTRA, &payload)
        .await
        .expect("BAM send");

    let frames: Vec<CanFrame> = bus.lock().await.sent.drain(..).collect();
    println!("   Frames on the wire: {} (announce + data)", frames.len());

    let before = rx.sink().inner().len();
    for frame in &frames {
        rx.decode(frame);
    }
    print!("   Decoded record: {}", &rx.sink().inner()[before..]);

    println!("\nQuickstart complete.");
}
