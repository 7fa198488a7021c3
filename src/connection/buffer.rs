//! Per-Connection Accumulation Buffer
//!
//! TCP is a stream protocol: a message may arrive in any number of pieces.
//! Each read lands in a fixed-size scratch array, is decoded, and appended
//! to a growing text buffer. The delimiter is then searched for across the
//! whole accumulated text, not just the newly appended piece, so a
//! delimiter split across two reads is still found.
//!
//! ```text
//!   read #1: "he"      accumulated: "he"        -> keep reading
//!   read #2: "llo;"    accumulated: "hello;"    -> message complete
//! ```

use crate::protocol::{charset, Delimiter};

/// Size of the receive scratch array.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Receive scratch space plus the decoded text received so far.
///
/// The accumulated text always equals every byte received on the
/// connection, decoded, in receipt order. It is never cleared while the
/// connection is open; the text is handed out once, by
/// [`take_message`](Self::take_message) or [`into_message`](Self::into_message).
#[derive(Debug)]
pub struct ConnectionBuffer {
    /// Raw bytes of the most recent read
    scratch: Box<[u8; RECEIVE_BUFFER_SIZE]>,

    /// Everything received so far, decoded
    accumulated: String,

    /// Total bytes received
    received: usize,
}

impl ConnectionBuffer {
    pub fn new() -> Self {
        Self {
            scratch: Box::new([0u8; RECEIVE_BUFFER_SIZE]),
            accumulated: String::new(),
            received: 0,
        }
    }

    /// The scratch array a read should fill.
    pub fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch[..]
    }

    /// Decodes the first `n` scratch bytes and appends them to the
    /// accumulated text.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`RECEIVE_BUFFER_SIZE`].
    pub fn commit(&mut self, n: usize) {
        charset::decode_into(&self.scratch[..n], &mut self.accumulated);
        self.received += n;
    }

    /// Appends already-received bytes, bypassing the scratch array.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        charset::decode_into(bytes, &mut self.accumulated);
        self.received += bytes.len();
    }

    /// Scans the whole accumulated text for the delimiter.
    pub fn contains_delimiter(&self, delimiter: &Delimiter) -> bool {
        delimiter.is_in(&self.accumulated)
    }

    /// The text accumulated so far.
    pub fn as_str(&self) -> &str {
        &self.accumulated
    }

    /// Number of bytes received so far.
    ///
    /// The charset is single-byte, so this is also the character count,
    /// though not the `String` length once bytes above 0x7F show up.
    pub fn len(&self) -> usize {
        self.received
    }

    pub fn is_empty(&self) -> bool {
        self.received == 0
    }

    /// Moves the complete message text out, leaving the buffer empty.
    ///
    /// The scratch array stays allocated; only the text changes hands.
    pub fn take_message(&mut self) -> String {
        self.received = 0;
        std::mem::take(&mut self.accumulated)
    }

    /// Consumes the buffer and returns the complete message text.
    ///
    /// No truncation happens at the delimiter: bytes that arrived after it in
    /// the same read are part of the message.
    pub fn into_message(self) -> String {
        self.accumulated
    }
}

impl Default for ConnectionBuffer {
    fn default() -> Self {
        Self::new()
    }
}
