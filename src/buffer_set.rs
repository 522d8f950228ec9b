//! Buffer set for state machine operations.
//!
//! A single `BufferSet` is threaded through a state machine's entire
//! lifetime: the caller (a waiting strategy) fills `read_buffer` with
//! whatever `Action` asked for and drains `write_buffer` when asked to
//! write. `column_buffer` caches the current `RowDescription` payload so
//! per-row decoding can re-parse it without the state machine borrowing
//! across `step()` calls.

/// Buffers shared between a protocol state machine and its caller.
pub struct BufferSet {
    /// Payload of the last message read (the 4-byte length prefix and
    /// type byte are not included).
    pub read_buffer: Vec<u8>,
    /// Pending bytes to write to the transport.
    pub write_buffer: Vec<u8>,
    /// Cached `RowDescription` payload for the current result.
    pub column_buffer: Vec<u8>,
    /// Type byte of the last message read.
    pub type_byte: u8,
}

impl BufferSet {
    /// Create a new, empty buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(1024),
            column_buffer: Vec::new(),
            type_byte: 0,
        }
    }

    /// Reset all buffers to empty while retaining their capacity.
    pub fn reset(&mut self) {
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.column_buffer.clear();
        self.type_byte = 0;
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
