//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (CAN identifier construction,
//! BAM segmentation, transmission, and related issues).
use crate::protocol::transport::bam::MAX_BAM_PAYLOAD;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur while building a 29-bit CAN identifier.
pub enum CanIdBuildError {
    /// The PGN does not fit into the 18-bit parameter group space.
    #[error("PGN does not fit in 18 bits: {pgn:#x}")]
    InvalidPgn { pgn: u32 },
    /// A PDU1 PGN with a zero PDU-specific byte needs an explicit destination.
    #[error("PDU1 PGN requires a destination address")]
    MissingDestination,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while segmenting a payload into a BAM transfer.
pub enum BamBuildError {
    /// No payload available to announce.
    #[error("payload is empty: unable to build")]
    EmptyPayload,
    /// The payload fits a single frame and must not ride the transport protocol.
    #[error("payload fits a single frame: {len} bytes")]
    FitsSingleFrame { len: usize },
    /// The payload exceeds what 255 packets of 7 bytes can carry.
    #[error("payload exceeds {MAX_BAM_PAYLOAD} bytes: {len}")]
    PayloadTooLarge { len: usize },
    /// Transport identifier could not be built.
    #[error(transparent)]
    Build(#[from] CanIdBuildError),
}

//==================================================================================SEND_ERROR
#[derive(Error, Debug)]
/// Errors encountered when sending a message (gating + build + transmit).
pub enum SendError<E: core::fmt::Debug> {
    /// Single-frame payloads are capped at eight bytes.
    #[error("payload exceeds the single-frame limit: {len} bytes")]
    PayloadTooLarge { len: usize },
    /// The bus stayed busy past the back-off window.
    #[error("bus busy past back-off")]
    BusBusy,
    /// The transceiver lock could not be taken within the retry budget.
    #[error("transceiver lock timed out")]
    BusLockTimeout,
    /// The transceiver refused or failed to send the frame after retries.
    #[error("transmit failed after retries: {0:?}")]
    Transmit(E),
    /// BAM segmentation failed.
    #[error(transparent)]
    Bam(#[from] BamBuildError),
    /// CAN identifier could not be built.
    #[error(transparent)]
    Build(#[from] CanIdBuildError),
}
