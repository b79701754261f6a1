//! Hardware and boundary abstractions: the CAN transceiver seam, the timing
//! source, and the outbound message sink.
pub mod link_timer;
pub mod message_sink;
pub mod transceiver;
