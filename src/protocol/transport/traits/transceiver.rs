//! Minimal abstraction for the SPI-attached CAN controller. Allows the engine
//! to plug into various drivers (MCP2515, TWAI, desktop mocks, etc.).
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Contract for the CAN controller the data-link engine drives.
///
/// Each method maps onto one hardware transaction; callers hold the shared
/// transceiver lock for exactly one call at a time so receive and transmit
/// can interleave between the frames of a burst.
pub trait CanTransceiver {
    type Error: core::fmt::Debug;

    /// Reset the controller into its configuration state.
    fn reset(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Program the bus bitrate in kbit/s.
    fn set_bitrate(&mut self, bitrate_kbps: u16) -> impl Future<Output = Result<(), Self::Error>>;

    /// Leave configuration mode and join the bus.
    fn set_normal_mode(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Whether a received frame is waiting in a hardware buffer.
    fn check_receive(&mut self) -> impl Future<Output = bool>;

    /// Pop the next pending frame from the hardware buffers.
    fn read_frame(&mut self) -> impl Future<Output = Result<CanFrame, Self::Error>>;

    /// Emit a frame on the bus.
    fn send_frame<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;

    /// Acknowledge the receive interrupt so the line can fire again.
    fn clear_rx_interrupt(&mut self) -> impl Future<Output = ()>;
}
