//! Hixie-75 and Hixie-76 opening handshakes.
//!
//! Hixie-76 authenticates the server with an MD5 challenge: two header keys
//! encode 32-bit numbers (digits divided by the space count), which are
//! packed big-endian, concatenated with an 8-byte request body and hashed.
//! Some proxies deliver the body in a separate packet from the headers, so
//! the response is produced in two phases: the header block first, the
//! 16-byte digest once the body arrives.

use md5::{Digest, Md5};

use crate::error::{Error, Result};
use crate::handshake::request::RequestContext;
use crate::handshake::select_protocol;

/// Length of the request body that completes a Hixie-76 handshake.
pub const CHALLENGE_BODY_LEN: usize = 8;

/// Derive the 32-bit challenge number from a `Sec-WebSocket-Key1`/`Key2`
/// value: its digits in order as a decimal number, divided by the number of
/// spaces.
///
/// # Errors
///
/// Returns `Error::InvalidHandshake` if the key has no spaces, its digit
/// count overflows, or the number is not divisible by the space count.
pub fn challenge_number(key: &str) -> Result<u32> {
    let mut number: u64 = 0;
    for c in key.chars() {
        if let Some(digit) = c.to_digit(10) {
            number = number
                .checked_mul(10)
                .and_then(|n| n.checked_add(u64::from(digit)))
                .ok_or_else(|| {
                    Error::InvalidHandshake(format!("challenge key overflows: {key:?}"))
                })?;
        }
    }

    let spaces = key.chars().filter(|&c| c == ' ').count() as u64;
    if spaces == 0 {
        return Err(Error::InvalidHandshake(format!(
            "challenge key has no spaces: {key:?}"
        )));
    }
    if number % spaces != 0 {
        return Err(Error::InvalidHandshake(format!(
            "challenge key not divisible by its space count: {key:?}"
        )));
    }
    Ok((number / spaces) as u32)
}

/// Compute the 16-byte MD5 challenge response.
#[must_use]
pub fn challenge_response(number1: u32, number2: u32, body: &[u8; CHALLENGE_BODY_LEN]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(number1.to_be_bytes());
    hasher.update(number2.to_be_bytes());
    hasher.update(body);
    hasher.finalize().into()
}

/// The validated pieces of a Hixie-76 upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hixie76Handshake {
    number1: u32,
    number2: u32,
    origin: String,
    location: String,
    /// Subprotocols offered by the client.
    pub protocols: Vec<String>,
}

impl Hixie76Handshake {
    /// Validate the header portion of a Hixie-76 request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if either key header is missing or
    /// fails the digits/spaces rules.
    pub fn parse(ctx: &RequestContext) -> Result<Self> {
        let key1 = ctx
            .header("Sec-WebSocket-Key1")
            .ok_or_else(|| Error::InvalidHandshake("missing Sec-WebSocket-Key1".into()))?;
        let key2 = ctx
            .header("Sec-WebSocket-Key2")
            .ok_or_else(|| Error::InvalidHandshake("missing Sec-WebSocket-Key2".into()))?;

        Ok(Self {
            number1: challenge_number(key1)?,
            number2: challenge_number(key2)?,
            origin: ctx.header("Origin").unwrap_or("").to_string(),
            location: ctx.url(),
            protocols: ctx
                .header("Sec-WebSocket-Protocol")
                .map(|value| value.split(',').map(|p| p.trim().to_string()).collect())
                .unwrap_or_default(),
        })
    }

    /// Select a subprotocol from the client's offer.
    #[must_use]
    pub fn negotiate(&self, acceptable: &[String]) -> Option<String> {
        select_protocol(&self.protocols, acceptable)
    }

    /// Serialize the status line and header block, through the blank line.
    ///
    /// This is everything that can be sent before the 8-byte body arrives.
    #[must_use]
    pub fn response_head(&self, protocol: Option<&str>) -> Vec<u8> {
        let mut out = Vec::with_capacity(192);
        out.extend_from_slice(b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n");
        out.extend_from_slice(b"Upgrade: WebSocket\r\n");
        out.extend_from_slice(b"Connection: Upgrade\r\n");
        out.extend_from_slice(format!("Sec-WebSocket-Origin: {}\r\n", self.origin).as_bytes());
        out.extend_from_slice(format!("Sec-WebSocket-Location: {}\r\n", self.location).as_bytes());
        if let Some(protocol) = protocol {
            out.extend_from_slice(format!("Sec-WebSocket-Protocol: {protocol}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Compute the 16-byte digest that completes the handshake.
    #[must_use]
    pub fn signature(&self, body: &[u8; CHALLENGE_BODY_LEN]) -> [u8; 16] {
        challenge_response(self.number1, self.number2, body)
    }
}

/// Serialize the complete Hixie-75 response. No challenge, no body.
#[must_use]
pub fn hixie75_response(ctx: &RequestContext, protocol: Option<&str>) -> Vec<u8> {
    let mut out = Vec::with_capacity(192);
    out.extend_from_slice(b"HTTP/1.1 101 Web Socket Protocol Handshake\r\n");
    out.extend_from_slice(b"Upgrade: WebSocket\r\n");
    out.extend_from_slice(b"Connection: Upgrade\r\n");
    out.extend_from_slice(
        format!("WebSocket-Origin: {}\r\n", ctx.header("Origin").unwrap_or("")).as_bytes(),
    );
    out.extend_from_slice(format!("WebSocket-Location: {}\r\n", ctx.url()).as_bytes());
    if let Some(protocol) = protocol {
        out.extend_from_slice(format!("WebSocket-Protocol: {protocol}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// The subprotocol offer of a Hixie-75 request (single header value).
#[must_use]
pub fn hixie75_protocols(ctx: &RequestContext) -> Vec<String> {
    ctx.header("WebSocket-Protocol")
        .map(|value| value.split(',').map(|p| p.trim().to_string()).collect())
        .unwrap_or_default()
}
