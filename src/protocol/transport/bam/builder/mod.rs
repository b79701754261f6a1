//! CAN frame generator for BAM transfers. Builds the announce frame and the
//! ordered TP.DT sequence from an application payload.
use crate::error::BamBuildError;
use crate::protocol::transport::bam::{
    packet_count, BROADCAST_ADDRESS, BYTES_PER_PACKET, CONTROL_BAM, MAX_BAM_PAYLOAD, PGN_TP_CM,
    PGN_TP_DT, SEQUENCE_MODULUS,
};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;

#[derive(Debug)]
/// Shared parameters for all frames composing a BAM transfer.
pub struct BamBuilder<'a> {
    pgn: u32,
    session_tag: u8,
    payload: &'a [u8],
    total_packets: u16,
    cm_id: CanId,
    dt_id: CanId,
}

impl<'a> BamBuilder<'a> {
    /// Prepare a BAM encoder for a payload that genuinely needs the
    /// transport protocol (9 to 1785 bytes).
    ///
    /// Both transport identifiers are built up front so the frame iterator
    /// itself cannot fail.
    pub fn new(
        pgn: u32,
        source_address: u8,
        session_tag: u8,
        payload: &'a [u8],
    ) -> Result<Self, BamBuildError> {
        if payload.is_empty() {
            return Err(BamBuildError::EmptyPayload);
        }
        if payload.len() <= 8 {
            return Err(BamBuildError::FitsSingleFrame {
                len: payload.len(),
            });
        }
        if payload.len() > MAX_BAM_PAYLOAD {
            return Err(BamBuildError::PayloadTooLarge {
                len: payload.len(),
            });
        }

        let cm_id = CanId::builder(PGN_TP_CM, source_address)
            .to_destination(BROADCAST_ADDRESS)
            .build()?;
        let dt_id = CanId::builder(PGN_TP_DT, source_address)
            .to_destination(BROADCAST_ADDRESS)
            .build()?;

        Ok(Self {
            pgn,
            session_tag,
            payload,
            total_packets: packet_count(payload.len() as u16),
            cm_id,
            dt_id,
        })
    }

    /// Packets the transfer will occupy on the wire (announce excluded).
    pub fn total_packets(&self) -> u16 {
        self.total_packets
    }

    /// Start the iteration; the announce frame comes first, then each data
    /// frame in sequence order.
    pub fn build(&self) -> FrameIterator<'_> {
        FrameIterator {
            builder: self,
            next_index: 0,
        }
    }

    /// TP.CM broadcast announce frame.
    fn announce_frame(&self) -> CanFrame {
        let size = self.payload.len() as u16;
        let mut data = [0xFF; 8];

        data[0] = CONTROL_BAM | (self.session_tag << 4);
        data[1..3].copy_from_slice(&size.to_le_bytes());
        // Byte 3: packet count, 0xFF sentinel when it does not fit.
        data[3] = if self.total_packets > 255 {
            0xFF
        } else {
            self.total_packets as u8
        };
        // Byte 4: max packets per burst, unlimited for broadcast.
        data[4] = 0xFF;
        data[5] = (self.pgn & 0xFF) as u8;
        data[6] = ((self.pgn >> 8) & 0xFF) as u8;
        data[7] = ((self.pgn >> 16) & 0xFF) as u8;

        CanFrame::new(self.cm_id, data, 8)
    }

    /// TP.DT frame carrying packet `seq` (1-based).
    fn data_frame(&self, seq: u16) -> CanFrame {
        // The wire nibble wraps 1..=15; the reassembler's expected-sequence
        // rule tracks the same wrap.
        let seq_field = (((seq - 1) % SEQUENCE_MODULUS) + 1) as u8;
        let offset = (seq - 1) as usize * BYTES_PER_PACKET;
        let chunk = &self.payload[offset..usize::min(offset + BYTES_PER_PACKET, self.payload.len())];

        let mut data = [0xFF; 8];
        data[0] = seq_field | (self.session_tag << 4);
        data[1..1 + chunk.len()].copy_from_slice(chunk);

        CanFrame::new(self.dt_id, data, 8)
    }
}

/// Lazy iterator returning frames one by one as they are encoded.
pub struct FrameIterator<'a> {
    builder: &'a BamBuilder<'a>,
    next_index: u16,
}

impl Iterator for FrameIterator<'_> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = if self.next_index == 0 {
            self.builder.announce_frame()
        } else if self.next_index <= self.builder.total_packets {
            self.builder.data_frame(self.next_index)
        } else {
            return None;
        };

        self.next_index += 1;
        Some(frame)
    }
}
