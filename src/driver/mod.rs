//! The per-connection protocol engine.
//!
//! A [`Driver`] is bound to one peer, owns the embedder's [`Handler`] and
//! orchestrates the handshake, framing and close logic of whichever
//! protocol variant the peer speaks. Servers select the variant from the
//! request headers; clients always speak Hybi version 13.

mod hixie;
mod hybi;
mod queue;
mod role;
mod state;

pub use queue::PingCallback;
pub use role::Role;
pub use state::ReadyState;

use crate::config::Config;
use crate::error::Result;
use crate::event::Handler;
use crate::handshake::request::RequestContext;
use hixie::Hixie;
use hybi::Hybi;

/// A transport-agnostic WebSocket connection driver.
///
/// All access must be serialized by the embedder; the driver performs no
/// I/O and never blocks. Outbound bytes are delivered synchronously to the
/// handler's `write`, events to its `event`.
///
/// ```
/// use wsdriver::{Config, Driver, Event, Handler};
///
/// #[derive(Default)]
/// struct Echo {
///     wire: Vec<u8>,
/// }
///
/// impl Handler for Echo {
///     fn write(&mut self, bytes: &[u8]) {
///         self.wire.extend_from_slice(bytes);
///     }
///     fn event(&mut self, _event: Event) {}
/// }
///
/// let mut driver = Driver::client("ws://example.com/chat", Config::new(), Echo::default())
///     .expect("valid URL");
/// assert!(driver.start());
/// assert!(driver.handler().wire.starts_with(b"GET /chat HTTP/1.1\r\n"));
/// ```
pub struct Driver<H: Handler> {
    handler: H,
    proto: Proto,
}

enum Proto {
    Hybi(Hybi),
    Hixie(Hixie),
}

impl<H: Handler> Driver<H> {
    /// Create a server driver for the request described by `ctx`.
    ///
    /// The variant is chosen from the headers: `Sec-WebSocket-Version`
    /// means Hybi, otherwise `Sec-WebSocket-Key1` means Hixie-76,
    /// otherwise Hixie-75. Validation failures surface from [`start`]
    /// as `Error`/`Close` events.
    ///
    /// [`start`]: Driver::start
    pub fn server(ctx: &RequestContext, config: Config, handler: H) -> Self {
        let proto = if ctx.header("Sec-WebSocket-Version").is_some() {
            Proto::Hybi(Hybi::server(ctx, config))
        } else if ctx.header("Sec-WebSocket-Key1").is_some() {
            Proto::Hixie(Hixie::hixie76(ctx, config))
        } else {
            Proto::Hixie(Hixie::hixie75(ctx, config))
        };
        Self { handler, proto }
    }

    /// Create a Hybi version 13 client driver for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`](crate::Error::InvalidUrl) if `url` is
    /// not a usable `ws://` or `wss://` URL.
    pub fn client(url: &str, config: Config, handler: H) -> Result<Self> {
        Ok(Self {
            handler,
            proto: Proto::Hybi(Hybi::client(url, config)?),
        })
    }

    /// Emit the opening handshake bytes.
    ///
    /// For a client this writes the GET request; for a server the response
    /// (for Hixie-76 only its header block). Returns `true` iff bytes were
    /// emitted.
    pub fn start(&mut self) -> bool {
        match &mut self.proto {
            Proto::Hybi(driver) => driver.start(&mut self.handler),
            Proto::Hixie(driver) => driver.start(&mut self.handler),
        }
    }

    /// Feed inbound bytes from the transport.
    ///
    /// Any prefix of the stream may be fed at a time; events come out
    /// identical for every splitting of the same byte sequence. Input
    /// after the connection closed is discarded.
    pub fn parse(&mut self, bytes: &[u8]) {
        match &mut self.proto {
            Proto::Hybi(driver) => driver.parse(bytes, &mut self.handler),
            Proto::Hixie(driver) => driver.parse(bytes, &mut self.handler),
        }
    }

    /// Send a text message, queueing it if the handshake is still in
    /// progress. Returns `false` once the connection closed.
    pub fn text(&mut self, string: &str) -> bool {
        match &mut self.proto {
            Proto::Hybi(driver) => driver.text(string, &mut self.handler),
            Proto::Hixie(driver) => driver.text(string, &mut self.handler),
        }
    }

    /// Send a binary message. Hixie variants have no binary framing and
    /// return `false`.
    pub fn binary(&mut self, data: &[u8]) -> bool {
        match &mut self.proto {
            Proto::Hybi(driver) => driver.binary(data, &mut self.handler),
            Proto::Hixie(_) => false,
        }
    }

    /// Send a ping, with an optional callback fired when the matching pong
    /// arrives. Hixie variants have no ping frame and return `false`.
    pub fn ping(&mut self, payload: &[u8], callback: Option<PingCallback>) -> bool {
        match &mut self.proto {
            Proto::Hybi(driver) => driver.ping(payload, callback, &mut self.handler),
            Proto::Hixie(_) => false,
        }
    }

    /// Close the connection.
    ///
    /// Hybi sends a close frame and waits for the peer's (`Closing`
    /// state); Hixie closes immediately. Valid only while open or closing.
    pub fn close(&mut self, code: Option<u16>, reason: &str) -> bool {
        match &mut self.proto {
            Proto::Hybi(driver) => driver.close(code, reason, &mut self.handler),
            Proto::Hixie(driver) => driver.close(code, reason, &mut self.handler),
        }
    }

    /// The protocol variant in use: `"hixie-75"`, `"hixie-76"` or
    /// `"hybi-<version>"`.
    #[must_use]
    pub fn version(&self) -> &str {
        match &self.proto {
            Proto::Hybi(driver) => driver.version(),
            Proto::Hixie(driver) => driver.version_str(),
        }
    }

    /// The negotiated subprotocol, or empty when none was agreed.
    #[must_use]
    pub fn protocol(&self) -> &str {
        match &self.proto {
            Proto::Hybi(driver) => driver.protocol(),
            Proto::Hixie(driver) => driver.protocol(),
        }
    }

    /// The `ws://` or `wss://` URL of this connection.
    #[must_use]
    pub fn url(&self) -> &str {
        match &self.proto {
            Proto::Hybi(driver) => driver.url(),
            Proto::Hixie(driver) => driver.url(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReadyState {
        match &self.proto {
            Proto::Hybi(driver) => driver.state(),
            Proto::Hixie(driver) => driver.state(),
        }
    }

    /// Borrow the embedder handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutably borrow the embedder handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consume the driver, returning the handler.
    #[must_use]
    pub fn into_handler(self) -> H {
        self.handler
    }
}
