//! Streaming UTF-8 validation for text payloads.
//!
//! Text messages may arrive fragmented with multi-byte sequences split
//! across fragment boundaries, so validation has three outcomes: valid,
//! invalid, or incomplete-at-the-end. Incomplete tails are carried over to
//! the next fragment; on the final fragment they are an error.

use crate::error::{Error, Result};

/// Incremental UTF-8 validator.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    /// Unfinished multi-byte sequence carried from the previous fragment.
    /// Never longer than 3 bytes.
    pending: Vec<u8>,
}

impl Utf8Validator {
    /// Create a fresh validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next fragment.
    ///
    /// `fin` marks the final fragment of the message; an unfinished
    /// sequence at its end is then invalid.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` on any invalid sequence, or on a
    /// truncated sequence at the end of the final fragment.
    pub fn feed(&mut self, data: &[u8], fin: bool) -> Result<()> {
        let chunk: Vec<u8> = if self.pending.is_empty() {
            data.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(data);
            joined
        };

        match std::str::from_utf8(&chunk) {
            Ok(_) => Ok(()),
            Err(e) => {
                // error_len() is None only for a truncated sequence at the
                // very end, which a later fragment may still complete.
                if !fin && e.error_len().is_none() {
                    self.pending = chunk[e.valid_up_to()..].to_vec();
                    return Ok(());
                }
                Err(Error::InvalidUtf8)
            }
        }
    }

    /// Returns `true` if a multi-byte sequence is waiting for more input.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Discard any carried-over bytes.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Validate a complete byte slice as UTF-8.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` if the data is not valid UTF-8.
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data).map(drop).map_err(Error::from)
}
