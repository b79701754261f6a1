//! Outbound boundary for decoded traffic: every completed reassembly and
//! every plain single frame is handed to a [`MessageSink`].

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Size tag of a delivered record.
pub enum MessageSize {
    /// Reassembled multi-frame message with its announced byte count.
    Bytes(u16),
    /// Ordinary single-frame message.
    SingleFrame,
}

/// Consumer of decoded messages.
///
/// Implementations must not block: the receive pipeline calls this from its
/// frame-draining loop.
pub trait MessageSink {
    /// Deliver one decoded message. `data` holds the reassembled (or raw)
    /// payload bytes.
    fn on_message(&mut self, pgn: u32, sender: u8, size: MessageSize, data: &[u8]);
}
