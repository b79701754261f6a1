//! Outbound bus arbitration: tracks whether a BAM transfer currently owns
//! the bus, grants or denies transmit requests, and self-heals through a
//! watchdog when an owner goes silent without releasing.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::protocol::datalink::SessionKey;

/// Bus-hold budget granted per announced packet (ms).
const BUS_HOLD_PER_PACKET_MS: u64 = 200;
/// Fixed grace added on top of the per-packet budget (ms).
const BUS_HOLD_GRACE_MS: u64 = 500;

/// Upper bound on simultaneous owners, matching the reassembly session pool.
const MAX_OWNERS: usize = 6;

//==================================================================================BUS_STATE
#[derive(Debug)]
/// Mutable arbitration record. Owners are the BAM transfers currently
/// in flight on the bus.
struct BusState {
    busy: bool,
    busy_deadline_ms: u64,
    owners: [Option<SessionKey>; MAX_OWNERS],
}

impl BusState {
    const fn new() -> Self {
        Self {
            busy: false,
            busy_deadline_ms: 0,
            owners: [None; MAX_OWNERS],
        }
    }

    fn insert(&mut self, key: SessionKey) {
        if self.owners.iter().flatten().any(|k| *k == key) {
            return;
        }
        if let Some(slot) = self.owners.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(key);
        }
    }

    fn remove(&mut self, key: SessionKey) {
        for slot in self.owners.iter_mut() {
            if *slot == Some(key) {
                *slot = None;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.owners.iter().all(|slot| slot.is_none())
    }
}

//==================================================================================BUS_ARBITER
/// One arbitration record guarded by one lock, shared between the receive
/// path (remote transfers) and the transmit path (gating).
pub struct BusArbiter {
    state: Mutex<CriticalSectionRawMutex, RefCell<BusState>>,
    watchdog_ms: u64,
}

impl BusArbiter {
    /// `watchdog_ms` is the fallback hold window applied when an acquire
    /// cannot say how many packets remain outstanding.
    pub const fn new(watchdog_ms: u64) -> Self {
        Self {
            state: Mutex::new(RefCell::new(BusState::new())),
            watchdog_ms,
        }
    }

    /// Whether the outbound bus may be used right now.
    ///
    /// A deadline in the past means the owners died silently (BAM has no
    /// acknowledgement to notice this sooner); the bus is force-released so
    /// one wedged transfer can never block transmission forever.
    pub fn is_available(&self, now_ms: u64) -> bool {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if !state.busy {
                return true;
            }
            if now_ms > state.busy_deadline_ms {
                #[cfg(feature = "defmt")]
                defmt::warn!("BAM session timed out, releasing bus");
                state.busy = false;
                state.owners = [None; MAX_OWNERS];
                return true;
            }
            false
        })
    }

    /// Marks the bus busy on behalf of `key` until `packet_count` packets
    /// had a fair chance to complete.
    pub fn acquire(&self, key: SessionKey, packet_count: u16, now_ms: u64) {
        let hold_ms = if packet_count == 0 {
            self.watchdog_ms
        } else {
            packet_count as u64 * BUS_HOLD_PER_PACKET_MS + BUS_HOLD_GRACE_MS
        };

        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.busy = true;
            state.busy_deadline_ms = now_ms + hold_ms;
            state.insert(key);
        });
    }

    /// Drops `key` from the owner set; the bus frees up once the last owner
    /// is gone.
    pub fn release(&self, key: SessionKey) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.remove(key);
            if state.is_empty() {
                state.busy = false;
            }
        });
    }

    /// Number of live owners; used by diagnostics and tests.
    pub fn owner_count(&self) -> usize {
        self.state
            .lock(|state| state.borrow().owners.iter().flatten().count())
    }
}
