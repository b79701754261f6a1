//! Creation and extraction of the 29-bit CAN identifiers defined by
//! SAE J1939-21.
use crate::error::CanIdBuildError;

// Define, build, and decompose a J1939 CAN identifier.

/// Marker bit flagging an extended (29-bit) identifier on the wire.
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Mask selecting the 29 identifier bits out of a raw `u32`.
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// PDU formats below this threshold address a specific node (PDU1); formats
/// at or above it broadcast (PDU2).
pub const PDU1_THRESHOLD: u8 = 240;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Encapsulates an extended CAN identifier (29 bits) and exposes accessors
/// for priority, PDU fields, PGN, and source address.
pub struct CanId(pub u32);

impl CanId {
    // Builder entry point
    /// Creates a pre-configured `CanIdBuilder` for a PGN and source address.
    pub fn builder(pgn: u32, source_address: u8) -> CanIdBuilder {
        CanIdBuilder::new(pgn, source_address)
    }

    /// Accepts a raw identifier read from the transceiver. Returns `None`
    /// when the extended-identifier marker is missing; such frames are
    /// silently dropped by the receive pipeline.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw & CAN_EFF_FLAG == 0 {
            return None;
        }
        Some(Self(raw & CAN_EFF_MASK))
    }

    /// Raw identifier with the extended marker set, ready for transmission.
    pub fn raw(&self) -> u32 {
        self.0 | CAN_EFF_FLAG
    }

    // Getters used to deconstruct the identifier
    /// Returns the priority (3 bits, value 0-7) encoded in the CAN ID.
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// PDU format byte (PF).
    pub fn pdu_format(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// PDU specific byte (PS): destination address in PDU1, group extension
    /// in PDU2.
    pub fn pdu_specific(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Extracts the PGN, handling the PDU1/PDU2 distinction.
    pub fn pgn(&self) -> u32 {
        let pf = self.pdu_format();
        if pf < PDU1_THRESHOLD {
            // PDU1: PS stores the explicit destination, not part of the PGN.
            (pf as u32) << 8
        } else {
            // PDU2: implicit destination, PS becomes part of the PGN.
            ((pf as u32) << 8) | self.pdu_specific() as u32
        }
    }

    /// Returns the destination address (PDU1) when the identifier carries one.
    pub fn destination(&self) -> Option<u8> {
        if self.pdu_format() < PDU1_THRESHOLD {
            Some(self.pdu_specific())
        } else {
            None
        }
    }

    /// Eight-bit source address (logical node identifier on the bus).
    pub fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

//==================================================================================CAN_ID_BUILDER
#[derive(Debug)]
/// Fluent builder that applies the PDU1/PDU2 rules.
pub struct CanIdBuilder {
    pub priority: u8,
    pub pgn: u32,
    pub source_address: u8,
    pub destination: Option<u8>,
}

impl CanIdBuilder {
    /// Initializes the builder for a given PGN and source address.
    pub fn new(pgn: u32, source_address: u8) -> Self {
        Self {
            priority: 6, // Default priority
            pgn,
            source_address,
            destination: None,
        }
    }

    /// Sets the priority (3 bits) to use during construction.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Assigns a destination address for PDU1 PGNs whose PS byte is zero.
    pub fn to_destination(mut self, destination_address: u8) -> Self {
        self.destination = Some(destination_address);
        self
    }

    /// Builds the CAN identifier while applying the J1939 rules:
    /// - the PS byte comes from the PGN's low byte whenever it is non-zero
    ///   (PDU2 group extension, or a PDU1 PGN that folds its destination into
    ///   the parameter group, e.g. `0xEF20` addressing node `0x20`)
    /// - a PDU1 PGN with a zero low byte takes the explicit `destination`
    /// - PF/PS bits are copied from the provided PGN, reserved and data-page
    ///   bits stay zero
    ///
    /// Returns a dedicated error when the configuration violates these rules.
    pub fn build(self) -> Result<CanId, CanIdBuildError> {
        if self.pgn > 0x3FFFF {
            return Err(CanIdBuildError::InvalidPgn { pgn: self.pgn });
        }

        let pf_from_pgn = ((self.pgn >> 8) & 0xFF) as u8;
        let ps_from_pgn = (self.pgn & 0xFF) as u8;

        let ps = if pf_from_pgn >= PDU1_THRESHOLD || ps_from_pgn != 0 {
            ps_from_pgn
        } else {
            match self.destination {
                Some(da) => da,
                None => return Err(CanIdBuildError::MissingDestination),
            }
        };

        let id = ((self.priority as u32) << 26)
            | ((pf_from_pgn as u32) << 16)
            | ((ps as u32) << 8)
            | (self.source_address as u32);
        Ok(CanId(id))
    }
}
