//! Opening handshakes for all protocol variants.

use std::collections::HashMap;

pub mod hixie;
pub mod hybi;
pub mod request;

pub use request::{is_websocket, RequestContext};

/// Pick the subprotocol to speak: the first of the server's acceptable list
/// that also appears in the client's offer.
pub(crate) fn select_protocol(offered: &[String], acceptable: &[String]) -> Option<String> {
    acceptable
        .iter()
        .find(|p| offered.iter().any(|o| o == *p))
        .cloned()
}

/// Parse HTTP header lines into a map with lowercase names and trimmed
/// values. Stops at the first empty line.
pub(crate) fn parse_header_block<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}
