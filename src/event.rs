//! Semantic events and the embedder-facing sink.

use crate::message::Message;

/// Events surfaced to the embedding application.
///
/// `Open` fires exactly once, before any `Message`; `Close` is the last
/// event and fires exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// Handshake completed; `protocol` is the negotiated subprotocol or
    /// empty.
    Open {
        /// Negotiated subprotocol, possibly empty.
        protocol: String,
    },
    /// A complete inbound message.
    Message(Message),
    /// An inbound ping; the driver has already written the matching pong.
    Ping(Vec<u8>),
    /// An inbound pong.
    Pong(Vec<u8>),
    /// The connection finished closing.
    Close {
        /// Close code; 1005 when the peer sent none, 1006 when no close
        /// frame arrived at all.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// A protocol, charset or policy fault. Always followed by `Close`.
    Error {
        /// Human-readable description of the fault.
        message: String,
    },
}

/// Embedder-supplied sinks for wire bytes and events.
///
/// The driver performs no I/O itself; every outbound byte is delivered
/// synchronously through [`write`](Handler::write), and every semantic
/// event through [`event`](Handler::event). Neither call may fail.
pub trait Handler {
    /// Deliver outbound wire bytes to the transport.
    fn write(&mut self, bytes: &[u8]);

    /// Deliver a semantic event to the application.
    fn event(&mut self, event: Event);
}
