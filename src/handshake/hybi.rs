//! Hybi (RFC 6455) opening handshake.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{thread_rng, Rng};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::handshake::request::RequestContext;
use crate::handshake::{parse_header_block, select_protocol};

/// GUID appended to the client key in the accept computation (RFC 6455
/// Section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol versions this driver accepts from clients.
pub const SUPPORTED_VERSIONS: &[u8] = &[8, 13];

/// Compute `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
///
/// # Example
///
/// ```
/// use wsdriver::handshake::hybi::compute_accept;
///
/// let accept = compute_accept("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh 16-byte `Sec-WebSocket-Key`, base64-encoded.
#[must_use]
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    thread_rng().fill(&mut nonce);
    BASE64.encode(nonce)
}

/// The validated pieces of a client's upgrade request, as seen by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandshake {
    /// The client's `Sec-WebSocket-Key`.
    pub key: String,
    /// The negotiated protocol version (8 or 13).
    pub version: u8,
    /// Subprotocols offered by the client.
    pub protocols: Vec<String>,
}

impl ServerHandshake {
    /// Validate an upgrade request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the request is not a WebSocket
    /// upgrade, the key is missing, or the version is unsupported.
    pub fn parse(ctx: &RequestContext) -> Result<Self> {
        if !ctx.is_websocket() {
            return Err(Error::InvalidHandshake(
                "not a WebSocket upgrade request".into(),
            ));
        }

        let key = ctx
            .header("Sec-WebSocket-Key")
            .ok_or_else(|| Error::InvalidHandshake("missing Sec-WebSocket-Key".into()))?
            .to_string();

        let version_str = ctx
            .header("Sec-WebSocket-Version")
            .ok_or_else(|| Error::InvalidHandshake("missing Sec-WebSocket-Version".into()))?;
        let version: u8 = version_str.parse().map_err(|_| {
            Error::InvalidHandshake(format!("invalid Sec-WebSocket-Version: {version_str}"))
        })?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::InvalidHandshake(format!(
                "unsupported WebSocket version: {version}"
            )));
        }

        let protocols = ctx
            .header("Sec-WebSocket-Protocol")
            .map(split_protocol_list)
            .unwrap_or_default();

        Ok(Self {
            key,
            version,
            protocols,
        })
    }

    /// Select a subprotocol from the client's offer.
    #[must_use]
    pub fn negotiate(&self, acceptable: &[String]) -> Option<String> {
        select_protocol(&self.protocols, acceptable)
    }

    /// Serialize the `101 Switching Protocols` response.
    #[must_use]
    pub fn response(&self, protocol: Option<&str>) -> Vec<u8> {
        let mut out = Vec::with_capacity(160);
        out.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        out.extend_from_slice(b"Upgrade: websocket\r\n");
        out.extend_from_slice(b"Connection: Upgrade\r\n");
        out.extend_from_slice(
            format!("Sec-WebSocket-Accept: {}\r\n", compute_accept(&self.key)).as_bytes(),
        );
        if let Some(protocol) = protocol {
            out.extend_from_slice(format!("Sec-WebSocket-Protocol: {protocol}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// Client side of the Hybi handshake: request generation and response
/// validation against the sent key.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    key: String,
    protocols: Vec<String>,
}

impl ClientHandshake {
    /// Create a handshake with a fresh random key.
    #[must_use]
    pub fn new(protocols: &[String]) -> Self {
        Self {
            key: generate_key(),
            protocols: protocols.to_vec(),
        }
    }

    /// The base64 key this handshake sent (or will send).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize the upgrade request for `host` and `path`.
    #[must_use]
    pub fn request(&self, host: &str, path: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(192);
        out.extend_from_slice(format!("GET {path} HTTP/1.1\r\n").as_bytes());
        out.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
        out.extend_from_slice(b"Upgrade: websocket\r\n");
        out.extend_from_slice(b"Connection: Upgrade\r\n");
        out.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        out.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
        if !self.protocols.is_empty() {
            out.extend_from_slice(
                format!("Sec-WebSocket-Protocol: {}\r\n", self.protocols.join(", ")).as_bytes(),
            );
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Validate the server's response block (through the blank line).
    ///
    /// Returns the subprotocol selected by the server, if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the status is not 101, the
    /// upgrade headers are wrong, `Sec-WebSocket-Accept` does not match the
    /// sent key, or the server selected a protocol that was never offered.
    pub fn validate_response(&self, data: &[u8]) -> Result<Option<String>> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("response is not valid UTF-8".into()))?;
        let mut lines = text.lines();

        let status = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("empty response".into()))?;
        if !status.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "expected 101 status, got: {status}"
            )));
        }

        let headers = parse_header_block(lines);

        let upgrade_ok = headers
            .get("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        if !upgrade_ok {
            return Err(Error::InvalidHandshake("missing Upgrade: websocket".into()));
        }
        let connection_ok = headers.get("connection").is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        if !connection_ok {
            return Err(Error::InvalidHandshake(
                "missing Connection: Upgrade".into(),
            ));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("missing Sec-WebSocket-Accept".into()))?;
        if *accept != compute_accept(&self.key) {
            return Err(Error::InvalidHandshake(
                "Sec-WebSocket-Accept does not match the sent key".into(),
            ));
        }

        match headers.get("sec-websocket-protocol") {
            Some(selected) => {
                if self.protocols.iter().any(|p| p == selected) {
                    Ok(Some(selected.clone()))
                } else {
                    Err(Error::InvalidHandshake(format!(
                        "server selected unoffered subprotocol: {selected}"
                    )))
                }
            }
            None => Ok(None),
        }
    }
}

/// Host, path and security of a `ws://` or `wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// Host (and optional port) portion.
    pub host: String,
    /// Absolute resource path, always starting with `/`.
    pub path: String,
    /// `true` for `wss://`.
    pub secure: bool,
}

/// Split a WebSocket URL into its parts.
///
/// # Errors
///
/// Returns `Error::InvalidUrl` if the scheme is not `ws`/`wss` or the host
/// is empty.
pub fn parse_url(url: &str) -> Result<UrlParts> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
    let secure = match scheme {
        "ws" => false,
        "wss" => true,
        _ => return Err(Error::InvalidUrl(url.to_string())),
    };
    let (host, path) = match rest.split_once('/') {
        Some((host, path)) => (host, format!("/{path}")),
        None => (rest, "/".to_string()),
    };
    if host.is_empty() {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    Ok(UrlParts {
        host: host.to_string(),
        path,
        secure,
    })
}

fn split_protocol_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
