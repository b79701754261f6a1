//! In-memory representation of an SAE J1939 CAN frame as exchanged with the
//! transceiver.
use crate::protocol::transport::can_id::CanId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Raw classic-CAN frame as read from or written to the bus.
pub struct CanFrame {
    /// Full identifier as the hardware sees it, extended marker included.
    pub can_id: u32,
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub dlc: u8,
    /// Payload buffer. Classic CAN frames always provide eight bytes.
    pub data: [u8; 8],
}

impl CanFrame {
    /// Builds an outbound frame from a parsed identifier. The extended
    /// marker is always set on emission.
    pub fn new(id: CanId, data: [u8; 8], dlc: u8) -> Self {
        Self {
            can_id: id.raw(),
            dlc: dlc.min(8),
            data,
        }
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::min(self.dlc as usize, 8)]
    }
}
