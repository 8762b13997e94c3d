//! Streaming encoder between the correlator and the transport.

use pgpipe_core::protocol::{FrontendMessage, MessageWriter};

use crate::correlator::OutputSink;

/// Bytes the encoder may hold before the driver stops granting output demand.
pub const DEFAULT_HIGH_WATER_MARK: usize = 8 * 1024;

/// Serializes delivered frontend messages into a pending byte buffer.
///
/// The driver drains [`pending`](Self::pending) to the transport and only
/// grants the correlator more output demand while
/// [`has_capacity`](Self::has_capacity) holds, so serialization never
/// outruns the socket.
#[derive(Debug)]
pub struct MessageEncoder {
    writer: MessageWriter,
    pending: Vec<u8>,
    high_water_mark: usize,
    encoded: u64,
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self::with_high_water_mark(DEFAULT_HIGH_WATER_MARK)
    }

    pub fn with_high_water_mark(high_water_mark: usize) -> Self {
        Self {
            writer: MessageWriter::new(),
            pending: Vec::with_capacity(high_water_mark),
            high_water_mark,
            encoded: 0,
        }
    }

    /// Serialize one message onto the end of the pending buffer.
    pub fn encode(&mut self, msg: &FrontendMessage) {
        let bytes = self.writer.write(msg);
        self.pending.extend_from_slice(bytes);
        self.encoded += 1;
        tracing::trace!(
            message = msg.name(),
            len = bytes.len(),
            buffered = self.pending.len(),
            "Encoded frontend message"
        );
    }

    /// Whether the buffer is below the high-water mark.
    pub fn has_capacity(&self) -> bool {
        self.pending.len() < self.high_water_mark
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Take the pending bytes for writing, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.high_water_mark))
    }

    /// Drop the pending bytes.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Messages encoded since creation.
    pub fn messages_encoded(&self) -> u64 {
        self.encoded
    }
}

impl OutputSink for MessageEncoder {
    fn deliver(&mut self, msg: FrontendMessage) {
        self.encode(&msg);
    }
}
