/// Test doubles to simulate the CAN transceiver and timer during
/// integration tests.
use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use tokio::time::{sleep, Duration, Instant};

use j1939_link::protocol::transport::can_frame::CanFrame;
use j1939_link::protocol::transport::traits::link_timer::LinkTimer;
use j1939_link::protocol::transport::traits::transceiver::CanTransceiver;

/// In-memory transceiver: frames "sent" are recorded, frames "received" are
/// whatever the test injected beforehand.
pub struct MockTransceiver {
    pub inbound: VecDeque<CanFrame>,
    pub sent: Vec<CanFrame>,
    /// Fail this many send attempts before succeeding again.
    pub fail_next_sends: usize,
}

impl MockTransceiver {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            fail_next_sends: 0,
        }
    }
}

impl CanTransceiver for MockTransceiver {
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
        if self.fail_next_sends > 0 {
            self.fail_next_sends -= 1;
            return Err(());
        }
        self.sent.push(*frame);
        Ok(())
    }

    async fn clear_rx_interrupt(&mut self) {}
}

pub type SharedBus = Mutex<CriticalSectionRawMutex, MockTransceiver>;

/// Timer backed by the tokio clock; tests run it paused so pacing delays
/// cost no wall time.
pub struct TokioTimer {
    start: Instant,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl LinkTimer for TokioTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Collects everything the device "sent" and clears the record.
#[allow(dead_code)]
pub async fn drain_sent(bus: &SharedBus) -> Vec<CanFrame> {
    bus.lock().await.sent.drain(..).collect()
}

/// Queues frames for the device to "receive".
#[allow(dead_code)]
pub async fn inject(bus: &SharedBus, frames: &[CanFrame]) {
    bus.lock().await.inbound.extend(frames.iter().copied());
}

/// Uppercase hex rendering, matching the sink's data field.
#[allow(dead_code)]
pub fn hex_upper(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for byte in bytes {
        write!(out, "{byte:02X}").expect("writing to a String cannot fail");
    }
    out
}
