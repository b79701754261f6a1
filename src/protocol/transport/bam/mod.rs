//! J1939-21 Broadcast Announce Message support: encapsulates payloads larger
//! than eight bytes across successive TP.DT frames, announced by a TP.CM
//! frame and carried without flow control.

/// Transport Protocol Connection Management (TP.CM) parameter group.
pub const PGN_TP_CM: u32 = 0xEC00;
/// Transport Protocol Data Transfer (TP.DT) parameter group.
pub const PGN_TP_DT: u32 = 0xEB00;

/// Global destination address.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Smallest payload that warrants the transport protocol; anything shorter
/// travels as a single frame.
pub const MIN_BAM_PAYLOAD: usize = 9;

/// Maximum payload a BAM transfer can carry once reassembled
/// (255 packets of 7 bytes).
pub const MAX_BAM_PAYLOAD: usize = 1785;

/// Payload bytes carried by each TP.DT frame.
pub const BYTES_PER_PACKET: usize = 7;

/// The TP.DT sequence nibble wraps after this many packets.
pub const SEQUENCE_MODULUS: u16 = 15;

/// Session tags usable on the wire. The other 4-bit values collide with
/// deployed control-byte encodings and are never emitted or accepted.
pub const SESSION_TAGS: [u8; 6] = [2, 3, 6, 7, 10, 11];

//==================================================================================TP_CM control bytes
/// TP.CM control byte announcing a broadcast transfer (low nibble 0).
pub const CONTROL_BAM: u8 = 0x20;
/// TP.CM low-nibble code for a broadcast announce.
pub const CODE_BAM: u8 = 0x00;
/// TP.CM low-nibble code for a point-to-point announce (RTS).
pub const CODE_RTS: u8 = 0x01;
/// TP.CM control byte tearing a connection down.
pub const CONTROL_ABORT: u8 = 0xFF;

/// Number of TP.DT packets needed for `size` payload bytes.
pub fn packet_count(size: u16) -> u16 {
    (size + BYTES_PER_PACKET as u16 - 1) / BYTES_PER_PACKET as u16
}

/// Whether a 4-bit session tag belongs to the usable pool.
pub fn is_valid_session_tag(tag: u8) -> bool {
    SESSION_TAGS.contains(&tag)
}

/// Human-readable name of a session tag, as surfaced in log records.
pub fn session_name(tag: u8) -> &'static str {
    match tag {
        2 => "A",
        3 => "B",
        6 => "C",
        7 => "D",
        10 => "E",
        11 => "F",
        _ => "Unknown",
    }
}

pub mod builder;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
