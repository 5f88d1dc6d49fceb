//! Connection lifecycle states.

/// Ready state of a driver.
///
/// `Connecting` until the handshake completes, then `Open`; a Hybi close
/// handshake passes through `Closing`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadyState {
    /// Handshake in progress.
    #[default]
    Connecting,
    /// Handshake complete, frames flow in both directions.
    Open,
    /// Local close frame sent, waiting for the peer's.
    Closing,
    /// Terminal. Sends return `false`, inbound bytes are discarded.
    Closed,
}

impl ReadyState {
    /// Returns `true` until the connection has fully closed.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, ReadyState::Closed)
    }

    /// Returns `true` while inbound frames are processed.
    #[inline]
    #[must_use]
    pub const fn can_receive(self) -> bool {
        matches!(self, ReadyState::Open | ReadyState::Closing)
    }
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        };
        f.write_str(name)
    }
}
