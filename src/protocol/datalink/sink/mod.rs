//! Default outbound sink: one newline-terminated JSON-style record per
//! decoded message, written to any `core::fmt::Write` stream.
use core::fmt;

use crate::protocol::transport::traits::message_sink::{MessageSink, MessageSize};

/// Emits records in the deployed fleet's format:
///
/// ```text
/// {"pgn":"0ef20","sender":48,"size":21,"data":"48656C6C6F..."}
/// {"pgn":"0ef00","sender":48,"size":"SF","data":"0102"}
/// ```
///
/// The PGN is zero-padded lowercase hex, the sender is bare uppercase hex
/// (a long-standing quirk downstream parsers rely on), data bytes are
/// uppercase hex without separators.
pub struct JsonLineSink<W: fmt::Write> {
    out: W,
}

impl<W: fmt::Write> JsonLineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Borrow the underlying stream.
    pub fn inner(&self) -> &W {
        &self.out
    }

    /// Hand back the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(
        &mut self,
        pgn: u32,
        sender: u8,
        size: MessageSize,
        data: &[u8],
    ) -> fmt::Result {
        write!(self.out, "{{\"pgn\":\"{pgn:05x}\",\"sender\":{sender:02X},\"size\":")?;
        match size {
            MessageSize::Bytes(n) => write!(self.out, "{n}")?,
            MessageSize::SingleFrame => self.out.write_str("\"SF\"")?,
        }
        self.out.write_str(",\"data\":\"")?;
        for byte in data {
            write!(self.out, "{byte:02X}")?;
        }
        self.out.write_str("\"}\n")
    }
}

impl<W: fmt::Write> MessageSink for JsonLineSink<W> {
    fn on_message(&mut self, pgn: u32, sender: u8, size: MessageSize, data: &[u8]) {
        if self.write_record(pgn, sender, size, data).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("sink write failed, record dropped");
        }
    }
}
