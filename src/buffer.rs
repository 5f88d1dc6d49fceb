//! Append-and-consume byte queue shared by all parsers.

use bytes::{Buf, BytesMut};

/// Inbound byte queue.
///
/// Parsers append with [`push`](ByteBuffer::push), inspect with
/// [`peek`](ByteBuffer::peek) and consume with [`read`](ByteBuffer::read),
/// [`read_until`](ByteBuffer::read_until) or [`skip`](ByteBuffer::skip).
/// Consumed prefixes are released; trailing incomplete input stays buffered.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    buf: BytesMut,
}

impl ByteBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the end of the queue.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no bytes are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the buffered bytes without consuming them.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// View the first `n` bytes without consuming, or `None` if fewer are
    /// buffered.
    #[must_use]
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        self.buf.get(..n)
    }

    /// Consume and return the first `n` bytes, or `None` if fewer are
    /// buffered (nothing is consumed then).
    pub fn read(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.buf.len() < n {
            return None;
        }
        Some(self.buf.split_to(n).to_vec())
    }

    /// Consume and return everything up to and including the first
    /// occurrence of `delim`, or `None` if the delimiter has not arrived
    /// yet (nothing is consumed then).
    pub fn read_until(&mut self, delim: &[u8]) -> Option<Vec<u8>> {
        let pos = find(&self.buf, delim)?;
        Some(self.buf.split_to(pos + delim.len()).to_vec())
    }

    /// Discard the first `n` bytes (or all of them if fewer are buffered).
    pub fn skip(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
