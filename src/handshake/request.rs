//! The server-side request context.
//!
//! Servers hand the driver a mapping of upper-snake-case, `HTTP_`-prefixed
//! header names plus `REQUEST_METHOD` and `REQUEST_URI`, the way CGI-style
//! HTTP frontends expose a request. The driver never parses a raw inbound
//! HTTP request itself.

use std::collections::HashMap;

/// HTTP request metadata supplied by the embedding server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    env: HashMap<String, String>,
}

impl RequestContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw entry such as `HTTP_UPGRADE` or `REQUEST_METHOD`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Look up a raw entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// The request method, if present.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.get("REQUEST_METHOD")
    }

    /// Look up a header by its HTTP name, e.g. `Sec-WebSocket-Key`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.get(&header_key(name))
    }

    /// Whether this request asks for a WebSocket upgrade: method GET,
    /// `Connection` containing the token `upgrade` and `Upgrade` equal to
    /// `websocket`, both case-insensitively.
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        if self.method() != Some("GET") {
            return false;
        }
        let connection_upgrades = self.header("Connection").is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        connection_upgrades
            && self
                .header("Upgrade")
                .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }

    /// The full `ws://` or `wss://` URL of this request.
    ///
    /// `HTTP_X_FORWARDED_PROTO` takes precedence over the `Origin` scheme
    /// when deciding whether the connection is secure.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        let host = self.header("Host").unwrap_or("");
        let uri = self.get("REQUEST_URI").unwrap_or("/");
        format!("{scheme}://{host}{uri}")
    }

    fn is_secure(&self) -> bool {
        match self.get("HTTP_X_FORWARDED_PROTO") {
            Some(proto) => proto.eq_ignore_ascii_case("https"),
            None => self
                .header("Origin")
                .is_some_and(|origin| origin.starts_with("https:")),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            env: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Returns `true` iff the request described by `ctx` asks for a WebSocket
/// upgrade.
#[must_use]
pub fn is_websocket(ctx: &RequestContext) -> bool {
    ctx.is_websocket()
}

fn header_key(name: &str) -> String {
    let mut key = String::with_capacity(5 + name.len());
    key.push_str("HTTP_");
    for c in name.chars() {
        key.push(match c {
            '-' => '_',
            c => c.to_ascii_uppercase(),
        });
    }
    key
}
