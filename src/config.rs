//! Configuration and limits for WebSocket drivers.

/// Size limits enforced by a driver.
///
/// These bound the memory a single connection can pin while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single frame in bytes.
    ///
    /// Default: 2^31 - 1. Larger frames are rejected with close code 1009.
    pub max_frame_size: usize,

    /// Maximum size of a reassembled message in bytes.
    ///
    /// Default: 2^31 - 1. Larger messages are rejected with close code 1009.
    pub max_message_size: usize,

    /// Maximum size of buffered handshake data in bytes.
    ///
    /// Default: 8 KiB.
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 0x7FFF_FFFF,
            max_message_size: 0x7FFF_FFFF,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_handshake_size,
        }
    }

    /// Validate an accumulated message size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if
    /// `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a declared frame payload size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if
    /// `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: u64) -> Result<(), crate::Error> {
        if size > self.max_frame_size as u64 {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate buffered handshake size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge)
    /// if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Driver configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Size limits.
    pub limits: Limits,

    /// Subprotocols this endpoint is willing to speak, in preference order.
    ///
    /// A server selects the first entry that also appears in the client's
    /// offer; a client sends the whole list in its handshake.
    pub protocols: Vec<String>,
}

impl Config {
    /// Create a configuration with default limits and no subprotocols.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the acceptable subprotocol list.
    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }
}
