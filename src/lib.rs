//! `j1939-link` library: SAE J1939-21 data-link and transport (BAM) engine
//! for `no_std` CAN nodes. The crate decodes incoming 29-bit frames into
//! parameter group messages, reassembles multi-frame broadcast transfers from
//! concurrent senders, and transmits single frames or paced BAM bursts while
//! arbitrating outbound bus access against transfers already in flight.
//!
//! Hardware and time stay behind traits (`CanTransceiver`, `LinkTimer`) so the
//! same engine runs on an embedded executor or under tokio in tests.
#![no_std]

#[cfg(test)]
extern crate std;

/// Domain and low-level errors (CAN identifier construction, BAM
/// segmentation, transmission, and related issues).
pub mod error;
/// J1939-21 protocol implementation: frame codec, BAM transport, bus
/// arbitration, and the receive/transmit pipelines.
pub mod protocol;
