//! J1939-21 data-link layer: bus arbitration, reassembly sessions, and the
//! receive/transmit pipelines, plus the parameter groups the link surfaces
//! to applications.

pub mod arbiter;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod sink;

pub use crate::protocol::transport::bam::{BROADCAST_ADDRESS, PGN_TP_CM, PGN_TP_DT};

//==================================================================================PGN definitions
pub const PGN_SINGLE_FRAME_TEST: u32 = 0xEF02;
pub const PGN_PEER_TO_PEER: u32 = 0xEF00;
pub const PGN_GROUP_MESSAGE: u32 = 0xEF10;
pub const PGN_EXTRA: u32 = 0xEF20;
pub const PGN_SOFTWARE_ID: u32 = 0xFEDA;
pub const PGN_COMPONENT_ID: u32 = 0xFEEB;
pub const PGN_REQUEST: u32 = 0xEA00;
pub const PGN_ACK: u32 = 0xE800;

/// Source address used when none is configured.
pub const DEFAULT_SOURCE_ADDRESS: u8 = 0x32;

/// Human-readable label for the parameter groups this link knows about.
pub fn pgn_name(pgn: u32) -> &'static str {
    match pgn {
        PGN_REQUEST => "Request",
        PGN_TP_CM => "TP_CM",
        PGN_TP_DT => "TP_DT",
        PGN_ACK => "Acknowledgment",
        PGN_COMPONENT_ID => "Component Identification",
        PGN_SOFTWARE_ID => "Software Identification",
        PGN_PEER_TO_PEER => "Peer to peer",
        PGN_GROUP_MESSAGE => "Broadcast",
        PGN_EXTRA => "extra PGN",
        PGN_SINGLE_FRAME_TEST => "Single Frame Test PGN",
        _ => "Unknown PGN",
    }
}

//==================================================================================SESSION_KEY
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Identifies one transport session: 4-bit session tag packed with the
/// 8-bit source address. Order of entries keyed this way never matters.
pub struct SessionKey(u16);

impl SessionKey {
    pub fn new(session_tag: u8, source: u8) -> Self {
        Self(((session_tag as u16) << 8) | source as u16)
    }

    pub fn session_tag(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn source(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

//==================================================================================LINK_CONFIG
#[derive(Clone, Debug)]
/// Tunables of one link controller instance.
pub struct LinkConfig {
    /// Source address stamped into every emitted frame.
    pub source_address: u8,
    /// A reassembly session silent for longer than this is reaped.
    pub session_timeout_ms: u64,
    /// Fallback bus-hold window when the packet count of the owning
    /// transfer is unknown.
    pub bus_busy_watchdog_ms: u64,
    /// Pause between consecutive TP.DT frames of an outgoing burst.
    pub inter_frame_pacing_ms: u32,
    /// Pause between the announce and the first data frame.
    pub post_announce_delay_ms: u32,
    /// Transmission attempts per frame before the burst is abandoned.
    pub send_retry_count: u8,
    /// Pause between transmission attempts of the same frame.
    pub send_retry_spacing_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            source_address: DEFAULT_SOURCE_ADDRESS,
            session_timeout_ms: 1000,
            bus_busy_watchdog_ms: 2000,
            inter_frame_pacing_ms: 50,
            post_announce_delay_ms: 10,
            send_retry_count: 3,
            send_retry_spacing_ms: 10,
        }
    }
}
