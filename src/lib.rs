//! # wsdriver - Transport-agnostic WebSocket protocol driver
//!
//! `wsdriver` implements the WebSocket wire protocol as a self-contained
//! state machine, decoupled from any transport. It consumes the inbound
//! byte stream via [`Driver::parse`], emits outbound bytes through an
//! embedder-supplied sink and surfaces semantic events (open, message,
//! ping/pong, close, error).
//!
//! ## Features
//!
//! - **Three protocol variants** - Hixie-75, Hixie-76 and Hybi
//!   (RFC 6455 versions 8/13), selected per connection from the request
//!   headers
//! - **No I/O, no runtime** - bytes in, bytes out; drive it from any
//!   transport or async runtime
//! - **Strict validation** - masking rules, fragmentation rules,
//!   streaming UTF-8, close-code ranges, size limits
//! - **Pre-open queueing** - messages sent before the handshake finishes
//!   flush in order on open
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsdriver::{Config, Driver, RequestContext};
//!
//! let mut driver = Driver::server(&ctx, Config::new(), handler);
//! driver.start();                  // writes the handshake response
//! driver.parse(&bytes_from_peer);  // events flow to the handler
//! driver.text("hello");
//! driver.close(Some(1000), "done");
//! ```

pub mod buffer;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod handshake;
pub mod message;
pub mod protocol;

pub use buffer::ByteBuffer;
pub use config::{Config, Limits};
pub use driver::{Driver, PingCallback, ReadyState, Role};
pub use error::{Error, Result};
pub use event::{Event, Handler};
pub use handshake::{is_websocket, RequestContext};
pub use message::{CloseCode, Message};
pub use protocol::{Frame, OpCode};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<Event>();
        assert_send::<ReadyState>();
        assert_send::<Role>();
        assert_send::<RequestContext>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Message>();
        assert_sync::<Event>();
        assert_sync::<ReadyState>();
        assert_sync::<Role>();
    }
}
