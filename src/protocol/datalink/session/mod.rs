//! Reassembly sessions: rebuilds announced multi-frame transfers by
//! absorbing TP.DT packets, and hosts the keyed table with stale-entry
//! eviction.
use crate::protocol::datalink::SessionKey;
use crate::protocol::transport::bam::{BYTES_PER_PACKET, MAX_BAM_PAYLOAD, SEQUENCE_MODULUS};

/// Maximum number of reassembly sessions handled in parallel.
pub const MAX_CONCURRENT_SESSIONS: usize = 6;

//==================================================================================DT_OUTCOME
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of absorbing one TP.DT packet into a session.
pub enum DtOutcome {
    /// Packet integrated; more fragments are still missing.
    Consumed,
    /// All announced packets arrived; the payload is complete.
    Completed,
    /// The sequence nibble did not match the expected one. The session must
    /// be discarded: BAM has no way to request a repeat.
    SequenceError { got: u8, expected: u8 },
    /// The packet would land past the announced size.
    Overflow,
}

//==================================================================================REASSEMBLY_SESSION
/// State of one in-flight transfer, keyed by `(session_tag, source)`.
pub struct ReassemblySession {
    key: SessionKey,
    /// Target PGN carried in the announce.
    pub pgn: u32,
    /// Announced payload length in bytes.
    pub total_size: u16,
    /// Announced (or derived) fragment count.
    pub total_packets: u16,
    /// Fragments absorbed so far; never exceeds `total_packets`.
    pub packets_received: u16,
    /// Timestamp of the last TP.CM or TP.DT for this key.
    pub last_activity_ms: u64,
    committed: u16,
    data: [u8; MAX_BAM_PAYLOAD],
}

impl ReassemblySession {
    /// Opens a session from an announce. `total_size` must already be
    /// validated against the 9..=1785 range.
    pub fn new(key: SessionKey, pgn: u32, total_size: u16, total_packets: u16, now_ms: u64) -> Self {
        Self {
            key,
            pgn,
            total_size,
            total_packets,
            packets_received: 0,
            last_activity_ms: now_ms,
            committed: 0,
            data: [0; MAX_BAM_PAYLOAD],
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Bytes committed so far. On completion this is the announced size,
    /// unless the announce undersold its packet count.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.committed as usize]
    }

    /// Absorb one TP.DT packet (`frame_data` is the full 8-byte payload,
    /// sequence nibble included).
    ///
    /// The caller is responsible for discarding the session on any outcome
    /// other than [`DtOutcome::Consumed`].
    pub fn absorb(&mut self, sequence: u8, frame_data: &[u8; 8], now_ms: u64) -> DtOutcome {
        self.last_activity_ms = now_ms;

        let expected = ((self.packets_received % SEQUENCE_MODULUS) + 1) as u8;
        if sequence != expected {
            return DtOutcome::SequenceError {
                got: sequence,
                expected,
            };
        }

        let start = self.packets_received as usize * BYTES_PER_PACKET;
        if start >= self.total_size as usize {
            return DtOutcome::Overflow;
        }

        let n = usize::min(BYTES_PER_PACKET, self.total_size as usize - start);
        self.data[start..start + n].copy_from_slice(&frame_data[1..1 + n]);
        self.committed = (start + n) as u16;
        self.packets_received += 1;

        if self.packets_received >= self.total_packets {
            DtOutcome::Completed
        } else {
            DtOutcome::Consumed
        }
    }

    /// Whether the session went silent for longer than `timeout_ms`.
    pub fn is_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) > timeout_ms
    }
}

//==================================================================================SESSION_TABLE
/// Fixed pool of reassembly sessions, addressed by [`SessionKey`].
///
/// Accessed only by the receive task, so no lock is required.
pub struct SessionTable {
    slots: [Option<ReassemblySession>; MAX_CONCURRENT_SESSIONS],
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_CONCURRENT_SESSIONS],
        }
    }

    /// Stores a freshly announced session. An entry with the same key is
    /// overwritten (the announce wins); returns `None` when the pool has no
    /// room left.
    pub fn open(&mut self, session: ReassemblySession) -> Option<&mut ReassemblySession> {
        let key = session.key();
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(s) if s.key() == key))
            .or_else(|| self.slots.iter().position(|slot| slot.is_none()))?;

        let slot = &mut self.slots[index];
        *slot = Some(session);
        slot.as_mut()
    }

    pub fn lookup(&mut self, key: SessionKey) -> Option<&mut ReassemblySession> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|session| session.key() == key)
    }

    /// Removes the entry for `key`; returns whether one existed. Bus
    /// ownership release is the caller's job, so the pairing stays visible
    /// at the call sites.
    pub fn close(&mut self, key: SessionKey) -> bool {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(s) if s.key() == key) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Removes every session originating from `source`, reporting each
    /// closed key. Used by the TP.CM abort path, whose control byte cannot
    /// name a single session tag.
    pub fn close_source(&mut self, source: u8, mut on_close: impl FnMut(SessionKey)) {
        for slot in self.slots.iter_mut() {
            if let Some(session) = slot {
                if session.key().source() == source {
                    let key = session.key();
                    *slot = None;
                    on_close(key);
                }
            }
        }
    }

    /// Reaps every session silent for longer than `timeout_ms`, reporting
    /// each evicted key through `on_evict`. Calling it twice with the same
    /// `now_ms` leaves the table unchanged the second time.
    pub fn sweep(&mut self, now_ms: u64, timeout_ms: u64, mut on_evict: impl FnMut(SessionKey)) {
        for slot in self.slots.iter_mut() {
            if let Some(session) = slot {
                if session.is_stale(now_ms, timeout_ms) {
                    let key = session.key();
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "Removing stale session {} ({:#x}) from src {:#x}",
                        crate::protocol::transport::bam::session_name(key.session_tag()),
                        key.session_tag(),
                        key.source()
                    );
                    *slot = None;
                    on_evict(key);
                }
            }
        }
    }

    /// Number of live entries; used by diagnostics and tests.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
