//! Transmit pipeline: emits single frames or paced BAM bursts, gating every
//! send on the bus arbiter, and hosts the transmit task's service loop over
//! the outbound request queue.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::{Mutex, MutexGuard};
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::error::SendError;
use crate::protocol::datalink::arbiter::BusArbiter;
use crate::protocol::datalink::LinkConfig;
use crate::protocol::transport::bam::builder::BamBuilder;
use crate::protocol::transport::bam::{MAX_BAM_PAYLOAD, SESSION_TAGS};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::traits::link_timer::LinkTimer;
use crate::protocol::transport::traits::transceiver::CanTransceiver;
use crate::protocol::transport::HARDWARE_LOCK_TIMEOUT_MS;

/// Back-off schedule when the bus is owned by a transfer: single frames wait
/// in short steps, bursts in longer ones.
const SINGLE_FRAME_BACKOFF: (u8, u32) = (5, 100);
const MULTI_FRAME_BACKOFF: (u8, u32) = (10, 200);

/// A request pulled from the outbound queue is dropped once it spent this
/// long failing to get onto the bus (ms).
pub const OUTBOUND_QUEUE_TIMEOUT_MS: u64 = 5000;

/// Pause between dispatch attempts for a queued request (ms).
const QUEUE_RETRY_DELAY_MS: u32 = 50;

//==================================================================================OUTBOUND_QUEUE
/// Application-level transmit request: payloads up to eight bytes leave as a
/// single frame, larger ones as a BAM burst.
pub struct OutboundRequest {
    pgn: u32,
    len: u16,
    data: [u8; MAX_BAM_PAYLOAD],
}

impl OutboundRequest {
    /// `None` when the payload is empty or beyond the transport maximum.
    pub fn new(pgn: u32, payload: &[u8]) -> Option<Self> {
        if payload.is_empty() || payload.len() > MAX_BAM_PAYLOAD {
            return None;
        }
        let mut data = [0; MAX_BAM_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            pgn,
            len: payload.len() as u16,
            data,
        })
    }

    pub fn pgn(&self) -> u32 {
        self.pgn
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// Bounded queue feeding the transmit task.
pub type OutboundQueue<const N: usize> =
    Channel<CriticalSectionRawMutex, OutboundRequest, N>;

//==================================================================================SENDER
/// Transmit half of the link controller.
///
/// Shares the transceiver (behind its mutex) and the bus arbiter with the
/// receive half; the rotating session tag is instance state so independent
/// controllers never interfere.
pub struct Sender<'a, B: CanTransceiver, T: LinkTimer> {
    bus: &'a Mutex<CriticalSectionRawMutex, B>,
    arbiter: &'a BusArbiter,
    timer: T,
    config: LinkConfig,
    next_session_idx: usize,
}

impl<'a, B: CanTransceiver, T: LinkTimer> Sender<'a, B, T> {
    pub fn new(
        bus: &'a Mutex<CriticalSectionRawMutex, B>,
        arbiter: &'a BusArbiter,
        timer: T,
        config: LinkConfig,
    ) -> Self {
        Self {
            bus,
            arbiter,
            timer,
            config,
            next_session_idx: 0,
        }
    }

    //==============================================================================Single frame
    /// Emits one frame carrying up to eight payload bytes.
    ///
    /// Waits out a busy bus (5 x 100 ms), then sends exactly once; the
    /// outcome is the transceiver's verdict.
    pub async fn send_single_frame(
        &mut self,
        pgn: u32,
        destination: u8,
        payload: &[u8],
    ) -> Result<(), SendError<B::Error>> {
        if payload.len() > 8 {
            return Err(SendError::PayloadTooLarge {
                len: payload.len(),
            });
        }

        self.back_off(SINGLE_FRAME_BACKOFF).await?;

        let id = CanId::builder(pgn, self.config.source_address)
            .to_destination(destination)
            .build()?;

        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        let frame = CanFrame::new(id, data, payload.len() as u8);

        let Some(mut bus) = self.lock_bus().await else {
            return Err(SendError::BusLockTimeout);
        };
        bus.send_frame(&frame).await.map_err(SendError::Transmit)
    }

    //==============================================================================Multi frame
    /// Broadcasts a payload of 9 to 1785 bytes as an announce plus paced
    /// TP.DT frames. A frame that keeps failing past the retry budget
    /// aborts the whole burst.
    pub async fn send_multi_frame(
        &mut self,
        pgn: u32,
        payload: &[u8],
    ) -> Result<(), SendError<B::Error>> {
        self.back_off(MULTI_FRAME_BACKOFF).await?;

        let session_tag = self.next_session_tag();
        let builder = BamBuilder::new(pgn, self.config.source_address, session_tag, payload)
            .map_err(SendError::Bam)?;

        let mut is_announce = true;
        for frame in builder.build() {
            self.send_frame_with_retry(&frame).await?;

            // Settle pause after the announce, fixed pacing between data
            // frames (J1939-21 allows 50-200 ms for BAM).
            let pause = if is_announce {
                self.config.post_announce_delay_ms
            } else {
                self.config.inter_frame_pacing_ms
            };
            self.timer.delay_ms(pause).await;
            is_announce = false;
        }

        Ok(())
    }

    /// Round-robin over the session tag pool.
    fn next_session_tag(&mut self) -> u8 {
        let tag = SESSION_TAGS[self.next_session_idx];
        self.next_session_idx = (self.next_session_idx + 1) % SESSION_TAGS.len();
        tag
    }

    //==============================================================================Shared plumbing
    /// Polls the arbiter until the bus frees up or the schedule is spent.
    async fn back_off(&mut self, (attempts, spacing_ms): (u8, u32)) -> Result<(), SendError<B::Error>> {
        if self.arbiter.is_available(self.timer.now_ms()) {
            return Ok(());
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("Bus is busy with a BAM session, delaying send");

        for _ in 0..attempts {
            self.timer.delay_ms(spacing_ms).await;
            if self.arbiter.is_available(self.timer.now_ms()) {
                return Ok(());
            }
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("Bus still busy after retry, aborting send");
        Err(SendError::BusBusy)
    }

    /// One frame, up to `send_retry_count` attempts. The hardware lock is
    /// taken per attempt; a lock timeout counts as a failed attempt.
    async fn send_frame_with_retry(
        &mut self,
        frame: &CanFrame,
    ) -> Result<(), SendError<B::Error>> {
        let mut last_error = None;

        for _attempt in 0..self.config.send_retry_count {
            match self.lock_bus().await {
                Some(mut bus) => match bus.send_frame(frame).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        #[cfg(feature = "defmt")]
                        defmt::warn!(
                            "Failed to send frame, retry {}: {}",
                            _attempt,
                            defmt::Debug2Format(&e)
                        );
                        last_error = Some(e);
                    }
                },
                None => {}
            }
            self.timer.delay_ms(self.config.send_retry_spacing_ms).await;
        }

        match last_error {
            Some(e) => Err(SendError::Transmit(e)),
            None => Err(SendError::BusLockTimeout),
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

    //==============================================================================Service loop
    /// Transmit task body: dispatch queued requests, retrying a blocked one
    /// until the queue timeout writes it off.
    pub async fn run<const N: usize>(&mut self, queue: &OutboundQueue<N>) -> ! {
        loop {
            let request = queue.receive().await;
            self.dispatch(&request).await;
        }
    }

    /// Sends one queued request, routing on payload size.
    pub async fn dispatch(&mut self, request: &OutboundRequest) {
        let deadline = self.timer.now_ms() + OUTBOUND_QUEUE_TIMEOUT_MS;

        loop {
            let result = if request.payload().len() <= 8 {
                self.send_single_frame(
                    request.pgn(),
                    crate::protocol::transport::bam::BROADCAST_ADDRESS,
                    request.payload(),
                )
                .await
            } else {
                self.send_multi_frame(request.pgn(), request.payload()).await
            };

            match result {
                Ok(()) => return,
                Err(_) if self.timer.now_ms() >= deadline => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Queued message timed out, removing");
                    return;
                }
                Err(_) => self.timer.delay_ms(QUEUE_RETRY_DELAY_MS).await,
            }
        }
    }
}
