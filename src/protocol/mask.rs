//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking is a pure function of the payload and a 4-byte key; XOR is its
//! own inverse, so the same call masks and unmasks.

/// XOR `data` in place against the 4-byte `key` with wrap-around indexing.
///
/// Processes a word at a time with a scalar tail.
///
/// # Example
///
/// ```
/// use wsdriver::protocol::apply_mask;
///
/// let key = [0x37, 0xfa, 0x21, 0x3d];
/// let mut data = b"Hello".to_vec();
/// apply_mask(&mut data, key);
/// assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
/// ```
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    let key_word = u32::from_ne_bytes(key);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(word ^ key_word).to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= key[i];
    }
}
