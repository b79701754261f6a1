//! Receive pipeline: dispatches incoming frames to the single-frame sink or
//! the TP.CM/TP.DT parsers, reassembles broadcast transfers, and hosts the
//! receive task's service loop.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::protocol::datalink::arbiter::BusArbiter;
use crate::protocol::datalink::session::{DtOutcome, ReassemblySession, SessionTable};
use crate::protocol::datalink::{LinkConfig, SessionKey, PGN_REQUEST};
use crate::protocol::transport::bam::{
    self, packet_count, CODE_BAM, CODE_RTS, CONTROL_ABORT, MAX_BAM_PAYLOAD, MIN_BAM_PAYLOAD,
    PGN_TP_CM, PGN_TP_DT,
};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::traits::link_timer::LinkTimer;
use crate::protocol::transport::traits::message_sink::{MessageSink, MessageSize};
use crate::protocol::transport::traits::transceiver::CanTransceiver;
use crate::protocol::transport::{HARDWARE_LOCK_TIMEOUT_MS, RX_IDLE_TICK_MS, RX_TRIGGER_WAIT_MS};

//==================================================================================RX_TRIGGER
/// Wake-up line between the CAN RX interrupt and the receive task.
///
/// The interrupt handler calls [`RxTrigger::notify`]; the service loop waits
/// on it with a bounded timeout and falls back to polling when no edge
/// arrives.
pub struct RxTrigger {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl RxTrigger {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Signal a pending receive. Safe to call from interrupt context.
    pub fn notify(&self) {
        self.signal.signal(());
    }

    /// Wait until the next notification.
    pub async fn wait(&self) {
        self.signal.wait().await;
    }
}

impl Default for RxTrigger {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================RECEIVER
/// Receive half of the link controller.
///
/// Exclusively owns the session table; shares the transceiver (behind its
/// mutex) and the bus arbiter with the transmit half.
pub struct Receiver<'a, B: CanTransceiver, T: LinkTimer, S: MessageSink> {
    bus: &'a Mutex<CriticalSectionRawMutex, B>,
    arbiter: &'a BusArbiter,
    timer: T,
    sink: S,
    sessions: SessionTable,
    config: LinkConfig,
}

impl<'a, B: CanTransceiver, T: LinkTimer, S: MessageSink> Receiver<'a, B, T, S> {
    pub fn new(
        bus: &'a Mutex<CriticalSectionRawMutex, B>,
        arbiter: &'a BusArbiter,
        timer: T,
        sink: S,
        config: LinkConfig,
    ) -> Self {
        Self {
            bus,
            arbiter,
            timer,
            sink,
            sessions: SessionTable::new(),
            config,
        }
    }

    /// Read access to the outbound sink (e.g. to flush or inspect it).
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Live reassembly sessions.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    //==============================================================================Decode pipeline
    /// Entry point for every frame read from the bus.
    ///
    /// Frames without the extended-identifier marker are dropped silently;
    /// everything else dispatches on the PGN.
    pub fn decode(&mut self, frame: &CanFrame) {
        let Some(id) = CanId::from_raw(frame.can_id) else {
            return;
        };
        let src = id.source_address();

        match id.pgn() {
            PGN_TP_CM => self.parse_tp_cm(frame, src),
            PGN_TP_DT => self.parse_tp_dt(frame, src),
            // Request frames are absorbed; answering them is an
            // application-layer concern.
            PGN_REQUEST => {}
            pgn => self
                .sink
                .on_message(pgn, src, MessageSize::SingleFrame, frame.payload()),
        }
    }

    /// Transport Protocol connection management (announce / abort).
    fn parse_tp_cm(&mut self, frame: &CanFrame, src: u8) {
        if frame.dlc < 8 {
            #[cfg(feature = "defmt")]
            defmt::warn!("Short TP.CM frame from src {:#x}, dropped", src);
            return;
        }

        let control = frame.data[0];
        let now = self.timer.now_ms();

        // The abort byte occupies the whole control octet, so it cannot name
        // a single session tag; it tears down everything the source owns.
        if control == CONTROL_ABORT {
            #[cfg(feature = "defmt")]
            defmt::debug!("Connection abort from src {:#x}", src);
            let arbiter = self.arbiter;
            self.sessions.close_source(src, |key| arbiter.release(key));
            return;
        }

        let session_tag = (control >> 4) & 0x0F;
        let key = SessionKey::new(session_tag, src);

        if !bam::is_valid_session_tag(session_tag) || !self.is_session_admissible(key, now) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Invalid or busy session: {} ({:#x}) from src {:#x}",
                bam::session_name(session_tag),
                session_tag,
                src
            );
            return;
        }

        self.sweep();

        match control & 0x0F {
            CODE_BAM => {
                let Some((total_size, total_packets, pgn)) = parse_announce(&frame.data) else {
                    return;
                };
                // A remote broadcast owns the outbound bus until its packets
                // had time to complete.
                self.arbiter.acquire(key, total_packets, now);
                let session = ReassemblySession::new(key, pgn, total_size, total_packets, now);
                if self.sessions.open(session).is_none() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Session pool exhausted, dropping announce from {:#x}", src);
                    self.arbiter.release(key);
                }
            }
            CODE_RTS => {
                // Point-to-point announce: open the session but leave the
                // bus alone. CTS flow control is out of scope, so the peer
                // is expected to stream like a broadcast.
                let Some((total_size, total_packets, pgn)) = parse_announce(&frame.data) else {
                    return;
                };
                let session = ReassemblySession::new(key, pgn, total_size, total_packets, now);
                if self.sessions.open(session).is_none() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Session pool exhausted, dropping announce from {:#x}", src);
                }
            }
            _ => {}
        }
    }

    /// Transport Protocol data transfer.
    fn parse_tp_dt(&mut self, frame: &CanFrame, src: u8) {
        if frame.dlc < 8 {
            #[cfg(feature = "defmt")]
            defmt::warn!("Short TP.DT frame from src {:#x}, dropped", src);
            return;
        }

        let first = frame.data[0];
        let sequence = first & 0x0F;
        let session_tag = (first >> 4) & 0x0F;

        if sequence == 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("Invalid sequence number: {}", sequence);
            return;
        }

        let key = SessionKey::new(session_tag, src);
        let now = self.timer.now_ms();

        let outcome = match self.sessions.lookup(key) {
            Some(session) => session.absorb(sequence, &frame.data, now),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "Received TP.DT for unknown session: {} ({:#x})",
                    bam::session_name(session_tag),
                    session_tag
                );
                return;
            }
        };

        match outcome {
            DtOutcome::Consumed => {}
            DtOutcome::Completed => {
                if let Some(session) = self.sessions.lookup(key) {
                    self.sink.on_message(
                        session.pgn,
                        src,
                        MessageSize::Bytes(session.total_size),
                        session.payload(),
                    );
                }
                self.close_session(key);
            }
            DtOutcome::SequenceError {
                got: _got,
                expected: _expected,
            } => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Out of sequence packet: got {}, expected {}", _got, _expected);
                self.close_session(key);
            }
            DtOutcome::Overflow => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Data position exceeds message size");
                self.close_session(key);
            }
        }
    }

    //==============================================================================Session upkeep
    /// Reaps every stale session and releases its bus ownership.
    pub fn sweep(&mut self) {
        let now = self.timer.now_ms();
        let arbiter = self.arbiter;
        self.sessions
            .sweep(now, self.config.session_timeout_ms, |key| {
                arbiter.release(key)
            });
    }

    /// A new announce is admissible when no live entry exists for its key;
    /// a stale entry is reaped on the spot and the announce proceeds.
    fn is_session_admissible(&mut self, key: SessionKey, now_ms: u64) -> bool {
        let stale = match self.sessions.lookup(key) {
            None => return true,
            Some(session) => session.is_stale(now_ms, self.config.session_timeout_ms),
        };
        if stale {
            self.close_session(key);
        }
        stale
    }

    fn close_session(&mut self, key: SessionKey) {
        self.sessions.close(key);
        self.arbiter.release(key);
    }

    //==============================================================================Service loop
    /// Receive task body: wait for the interrupt trigger (bounded), drain or
    /// poll the hardware, then give stale sessions their tick.
    pub async fn run(&mut self, trigger: &RxTrigger) -> ! {
        loop {
            let woken = {
                let wait = trigger.wait();
                let timeout = self.timer.delay_ms(RX_TRIGGER_WAIT_MS);
                pin_mut!(wait);
                pin_mut!(timeout);
                matches!(select(wait, timeout).await, Either::Left(_))
            };

            if woken {
                self.drain().await;
            } else {
                self.poll_once().await;
            }

            self.timer.delay_ms(RX_IDLE_TICK_MS).await;
            self.sweep();
        }
    }

    /// Drains every pending hardware frame, then acknowledges the interrupt.
    /// Skipped when the transceiver lock cannot be had in time; the next
    /// tick retries.
    pub async fn drain(&mut self) {
        let Some(mut bus) = self.lock_bus().await else {
            return;
        };

        while bus.check_receive().await {
            match bus.read_frame().await {
                Ok(frame) => self.decode(&frame),
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Failed to read pending frame: {}", defmt::Debug2Format(&_e));
                    break;
                }
            }
        }
        bus.clear_rx_interrupt().await;
    }

    /// Single poll pass for the no-interrupt fallback path.
    pub async fn poll_once(&mut self) {
        let Some(mut bus) = self.lock_bus().await else {
            return;
        };

        if bus.check_receive().await {
            if let Ok(frame) = bus.read_frame().await {
                self.decode(&frame);
                bus.clear_rx_interrupt().await;
            }
        }
    }

    async fn lock_bus(&mut self) -> Option<MutexGuard<'a, CriticalSectionRawMutex, B>> {
        let lock = self.bus.lock();
        let timeout = self.timer.delay_ms(HARDWARE_LOCK_TIMEOUT_MS);
        pin_mut!(lock);
        pin_mut!(timeout);
        match select(lock, timeout).await {
            Either::Left((guard, _)) => Some(guard),
            Either::Right(_) => None,
        }
    }
}

/// Decodes the shared announce fields (bytes 1..8 of a TP.CM frame).
/// Returns `None`, with a warning, when the announced geometry is unusable.
fn parse_announce(data: &[u8; 8]) -> Option<(u16, u16, u32)> {
    let total_size = u16::from_le_bytes([data[1], data[2]]);
    let mut total_packets = data[3] as u16;
    let pgn = u32::from_le_bytes([data[5], data[6], data[7], 0]);

    let derived = packet_count(total_size);
    if total_packets == 0 || total_packets == 0xFF {
        total_packets = derived;
    }

    if derived == 0
        || (total_size as usize) < MIN_BAM_PAYLOAD
        || (total_size as usize) > MAX_BAM_PAYLOAD
    {
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "Invalid BAM parameters: size={}, packets={}",
            total_size,
            derived
        );
        return None;
    }

    Some((total_size, total_packets, pgn))
}
