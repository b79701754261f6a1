//! J1939 transport layer: CAN frame representations, 29-bit identifier
//! management, BAM segmentation, and the hardware abstraction traits.
//!
//! ## Timing Constants
//!
//! These constants bound every wait on the shared transceiver so a wedged
//! SPI transaction can never stall the engine.

pub mod bam;
pub mod can_frame;
pub mod can_id;
pub mod traits;

/// Bounded wait for the transceiver mutex (ms).
///
/// Both the receive and transmit paths take the hardware lock around a single
/// SPI transaction. When the lock cannot be had within this window the
/// operation is skipped and retried on the next tick or retry attempt.
///
/// # Timeout rationale
///
/// On a CAN bus @ 500 kbps a single 8-byte frame occupies the transceiver for
/// well under a millisecond; a peer holding the lock for a full transaction
/// plus SPI overhead stays far below 100 ms. Hitting the bound therefore
/// means the other task died inside a transaction, and waiting longer
/// would not help.
pub const HARDWARE_LOCK_TIMEOUT_MS: u32 = 100;

/// How long the receive task waits on the interrupt trigger before falling
/// back to a hardware poll (ms).
pub const RX_TRIGGER_WAIT_MS: u32 = 100;

/// Idle delay between receive passes (ms). Keeps the poll loop from spinning
/// while still sweeping stale sessions promptly.
pub const RX_IDLE_TICK_MS: u32 = 10;
