//! Error types for the WebSocket protocol driver.
//!
//! Protocol faults never escape the driver as `Err` values; the driver
//! converts them into `Error`/`Close` events and a state transition. The
//! lower-level codecs and handshake parsers return these errors directly so
//! they remain usable on their own.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or producing WebSocket traffic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Not enough input to decode the current frame or handshake.
    #[error("incomplete input: need {needed} more bytes")]
    Incomplete {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Opcode value outside the RFC 6455 table.
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Opcode reserved for future protocol revisions.
    #[error("reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// RSV1-3 set without a negotiated extension.
    #[error("reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Control frame with FIN = 0.
    #[error("control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload over 125 bytes.
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Server received an unmasked frame.
    #[error("client frame must be masked")]
    UnmaskedClientFrame,

    /// Client received a masked frame.
    #[error("server frame must not be masked")]
    MaskedServerFrame,

    /// Fragmentation sequence violation or similar framing fault.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text payload.
    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,

    /// Close frame carrying a code that must not appear on the wire.
    #[error("invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Frame payload exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared payload size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Reassembled message exceeds the configured maximum.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Accumulated message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Handshake data exceeds the configured maximum.
    #[error("handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Buffered handshake size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Malformed or unacceptable handshake.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// URL that cannot be used to open a client connection.
    #[error("invalid WebSocket URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Close code the driver puts on the wire when this fault tears the
    /// connection down.
    ///
    /// Charset faults map to 1007, policy faults (oversized frames and
    /// messages) to 1009, everything else to 1002.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Error::InvalidUtf8 => 1007,
            Error::FrameTooLarge { .. } | Error::MessageTooLarge { .. } => 1009,
            _ => 1002,
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
