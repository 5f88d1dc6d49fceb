//! Driver state machine for the Hybi (RFC 6455) wire format.

use std::collections::HashMap;

use log::{debug, trace};
use rand::{thread_rng, Rng};

use crate::buffer::ByteBuffer;
use crate::config::Config;
use crate::driver::queue::{OutboundQueue, PingCallback, Queued};
use crate::driver::role::Role;
use crate::driver::state::ReadyState;
use crate::error::{Error, Result};
use crate::event::{Event, Handler};
use crate::handshake::hybi::{parse_url, ClientHandshake, ServerHandshake};
use crate::handshake::request::RequestContext;
use crate::message::CloseCode;
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::frame::{Frame, MAX_CONTROL_PAYLOAD};
use crate::protocol::opcode::OpCode;

/// Close frame payloads cap at 125 bytes, two of which hold the code.
const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

pub(crate) struct Hybi {
    role: Role,
    state: ReadyState,
    config: Config,
    buffer: ByteBuffer,
    assembler: MessageAssembler,
    queue: OutboundQueue,
    pending_pings: HashMap<Vec<u8>, PingCallback>,
    protocol: String,
    url: String,
    version: String,
    close_sent: bool,
    /// Code and reason passed to a local `close()`, reported if the peer
    /// never answers with a close frame.
    local_close: Option<(u16, String)>,
    /// Server: prepared 101 response, or the validation error, consumed by
    /// `start()`.
    server_response: Option<Result<Vec<u8>>>,
    /// Client: prepared GET request, consumed by `start()`.
    client_request: Option<Vec<u8>>,
    /// Client: key state kept until the response is validated.
    client_handshake: Option<ClientHandshake>,
}

impl Hybi {
    pub fn server(ctx: &RequestContext, config: Config) -> Self {
        let version = format!(
            "hybi-{}",
            ctx.header("Sec-WebSocket-Version").unwrap_or("13")
        );
        let mut protocol = String::new();
        let response = ServerHandshake::parse(ctx).map(|handshake| {
            let selected = handshake.negotiate(&config.protocols);
            let response = handshake.response(selected.as_deref());
            protocol = selected.unwrap_or_default();
            response
        });

        Self {
            role: Role::Server,
            state: ReadyState::Connecting,
            buffer: ByteBuffer::new(),
            assembler: MessageAssembler::new(config.limits.max_message_size),
            queue: OutboundQueue::new(),
            pending_pings: HashMap::new(),
            protocol,
            url: ctx.url(),
            version,
            close_sent: false,
            local_close: None,
            server_response: Some(response),
            client_request: None,
            client_handshake: None,
            config,
        }
    }

    pub fn client(url: &str, config: Config) -> Result<Self> {
        let parts = parse_url(url)?;
        let handshake = ClientHandshake::new(&config.protocols);
        let request = handshake.request(&parts.host, &parts.path);

        Ok(Self {
            role: Role::Client,
            state: ReadyState::Connecting,
            buffer: ByteBuffer::new(),
            assembler: MessageAssembler::new(config.limits.max_message_size),
            queue: OutboundQueue::new(),
            pending_pings: HashMap::new(),
            protocol: String::new(),
            url: url.to_string(),
            version: "hybi-13".to_string(),
            close_sent: false,
            local_close: None,
            server_response: None,
            client_request: Some(request),
            client_handshake: Some(handshake),
            config,
        })
    }

    pub fn start<H: Handler>(&mut self, handler: &mut H) -> bool {
        if self.state != ReadyState::Connecting {
            return false;
        }
        if let Some(response) = self.server_response.take() {
            return match response {
                Ok(bytes) => {
                    handler.write(&bytes);
                    self.open(handler);
                    self.drive(handler);
                    true
                }
                Err(error) => {
                    self.fail(error, handler);
                    false
                }
            };
        }
        if let Some(request) = self.client_request.take() {
            handler.write(&request);
            self.drive(handler);
            return true;
        }
        false
    }

    pub fn parse<H: Handler>(&mut self, bytes: &[u8], handler: &mut H) {
        if self.state == ReadyState::Closed {
            return;
        }
        self.buffer.push(bytes);
        self.drive(handler);
    }

    pub fn text<H: Handler>(&mut self, string: &str, handler: &mut H) -> bool {
        match self.state {
            ReadyState::Closed => false,
            ReadyState::Open => {
                self.write_frame(&Frame::text(string.as_bytes().to_vec()), handler);
                true
            }
            _ => {
                self.queue.push(Queued::Text(string.to_string()));
                true
            }
        }
    }

    pub fn binary<H: Handler>(&mut self, data: &[u8], handler: &mut H) -> bool {
        match self.state {
            ReadyState::Closed => false,
            ReadyState::Open => {
                self.write_frame(&Frame::binary(data.to_vec()), handler);
                true
            }
            _ => {
                self.queue.push(Queued::Binary(data.to_vec()));
                true
            }
        }
    }

    pub fn ping<H: Handler>(
        &mut self,
        payload: &[u8],
        callback: Option<PingCallback>,
        handler: &mut H,
    ) -> bool {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return false;
        }
        match self.state {
            ReadyState::Closed => false,
            ReadyState::Open => {
                self.send_ping(payload.to_vec(), callback, handler);
                true
            }
            _ => {
                self.queue.push(Queued::Ping(payload.to_vec(), callback));
                true
            }
        }
    }

    pub fn close<H: Handler>(
        &mut self,
        code: Option<u16>,
        reason: &str,
        handler: &mut H,
    ) -> bool {
        match self.state {
            ReadyState::Open => {
                let code = match code {
                    Some(code) if CloseCode::is_valid_on_wire(code) => code,
                    _ => 1000,
                };
                debug!("closing connection: code={code}");
                self.write_frame(&Frame::close(Some(code), truncate_reason(reason)), handler);
                self.close_sent = true;
                self.local_close = Some((code, reason.to_string()));
                self.state = ReadyState::Closing;
                true
            }
            ReadyState::Closing => true,
            _ => false,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ReadyState {
        self.state
    }

    /// Consume as much buffered input as the current state allows.
    fn drive<H: Handler>(&mut self, handler: &mut H) {
        loop {
            match self.state {
                ReadyState::Connecting => {
                    if !self.drive_handshake(handler) {
                        return;
                    }
                }
                ReadyState::Open | ReadyState::Closing => {
                    if self.buffer.is_empty() {
                        return;
                    }
                    match Frame::parse(self.buffer.as_slice(), self.config.limits.max_frame_size)
                    {
                        Ok((frame, consumed)) => {
                            trace!(
                                "frame: opcode={:?} fin={} len={}",
                                frame.opcode,
                                frame.fin,
                                frame.payload().len()
                            );
                            self.buffer.skip(consumed);
                            if let Err(error) = self.handle_frame(frame, handler) {
                                self.fail(error, handler);
                                return;
                            }
                        }
                        Err(Error::Incomplete { .. }) => return,
                        Err(error) => {
                            self.fail(error, handler);
                            return;
                        }
                    }
                }
                ReadyState::Closed => {
                    self.buffer.clear();
                    return;
                }
            }
        }
    }

    /// Client side: wait for the response head, validate it, open.
    /// Returns `true` when the state advanced and the loop should continue.
    fn drive_handshake<H: Handler>(&mut self, handler: &mut H) -> bool {
        let Some(handshake) = self.client_handshake.as_ref() else {
            // Server handshake bytes travel out of band via the request
            // context; inbound bytes stay buffered until start() opens.
            return false;
        };
        if self.client_request.is_some() {
            // start() has not emitted the request yet.
            return false;
        }
        match self.buffer.read_until(b"\r\n\r\n") {
            Some(head) => match handshake.validate_response(&head) {
                Ok(selected) => {
                    self.protocol = selected.unwrap_or_default();
                    self.client_handshake = None;
                    self.open(handler);
                    true
                }
                Err(error) => {
                    self.fail(error, handler);
                    false
                }
            },
            None => {
                if let Err(error) = self.config.limits.check_handshake_size(self.buffer.len()) {
                    self.fail(error, handler);
                }
                false
            }
        }
    }

    fn handle_frame<H: Handler>(&mut self, frame: Frame, handler: &mut H) -> Result<()> {
        frame.validate()?;
        if self.role.expects_masked() && !frame.masked {
            return Err(Error::UnmaskedClientFrame);
        }
        if !self.role.expects_masked() && frame.masked {
            return Err(Error::MaskedServerFrame);
        }

        if self.state == ReadyState::Closing {
            // Our close frame is out; the peer's close frame (or anything
            // else it sends) finishes the handshake.
            if frame.opcode == OpCode::Close {
                let (code, reason) = parse_close_payload(frame.payload())?;
                self.finish_close(code, reason, handler);
            } else {
                let (code, reason) = self.local_close.take().unwrap_or((1000, String::new()));
                self.finish_close(code, reason, handler);
            }
            return Ok(());
        }

        match frame.opcode {
            OpCode::Close => {
                let (code, reason) = parse_close_payload(frame.payload())?;
                debug!("received close frame: code={code}");
                if !self.close_sent {
                    let echo = if code == 1005 { None } else { Some(code) };
                    self.write_frame(&Frame::close(echo, truncate_reason(&reason)), handler);
                    self.close_sent = true;
                }
                self.finish_close(code, reason, handler);
            }
            OpCode::Ping => {
                self.write_frame(&Frame::pong(frame.payload().to_vec()), handler);
                handler.event(Event::Ping(frame.into_payload()));
            }
            OpCode::Pong => {
                let payload = frame.into_payload();
                if let Some(callback) = self.pending_pings.remove(&payload) {
                    callback();
                }
                handler.event(Event::Pong(payload));
            }
            _ => {
                if let Some(message) = self.assembler.push(frame)? {
                    handler.event(Event::Message(message.into_message()?));
                }
            }
        }
        Ok(())
    }

    fn open<H: Handler>(&mut self, handler: &mut H) {
        debug!("connection open: url={} version={}", self.url, self.version);
        self.state = ReadyState::Open;
        let queued: Vec<Queued> = self.queue.drain().collect();
        for item in queued {
            match item {
                Queued::Text(string) => {
                    self.write_frame(&Frame::text(string.into_bytes()), handler);
                }
                Queued::Binary(data) => {
                    self.write_frame(&Frame::binary(data), handler);
                }
                Queued::Ping(payload, callback) => {
                    self.send_ping(payload, callback, handler);
                }
            }
        }
        handler.event(Event::Open {
            protocol: self.protocol.clone(),
        });
    }

    fn send_ping<H: Handler>(
        &mut self,
        payload: Vec<u8>,
        callback: Option<PingCallback>,
        handler: &mut H,
    ) {
        if let Some(callback) = callback {
            self.pending_pings.insert(payload.clone(), callback);
        }
        self.write_frame(&Frame::ping(payload), handler);
    }

    fn write_frame<H: Handler>(&mut self, frame: &Frame, handler: &mut H) {
        let key = self.role.must_mask().then(random_key);
        handler.write(&frame.encode(key));
    }

    /// Tear the connection down over a protocol, charset or policy fault.
    fn fail<H: Handler>(&mut self, error: Error, handler: &mut H) {
        if self.state == ReadyState::Closed {
            return;
        }
        let message = error.to_string();
        let code = error.close_code();
        debug!("connection failed: {message}");
        handler.event(Event::Error {
            message: message.clone(),
        });
        if self.state.can_receive() && !self.close_sent {
            self.write_frame(&Frame::close(Some(code), truncate_reason(&message)), handler);
            self.close_sent = true;
        }
        self.finish_close(code, message, handler);
    }

    fn finish_close<H: Handler>(&mut self, code: u16, reason: String, handler: &mut H) {
        trace!("connection closed: code={code}");
        self.state = ReadyState::Closed;
        self.buffer.clear();
        self.pending_pings.clear();
        handler.event(Event::Close { code, reason });
    }
}

fn random_key() -> [u8; 4] {
    thread_rng().gen()
}

/// Decode a close frame payload into code and reason.
///
/// An empty payload synthesizes 1005; a single byte, a code outside the
/// permitted ranges, or a non-UTF-8 reason are protocol faults.
fn parse_close_payload(payload: &[u8]) -> Result<(u16, String)> {
    match payload.len() {
        0 => Ok((1005, String::new())),
        1 => Err(Error::ProtocolViolation(
            "close frame with one-byte payload".into(),
        )),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !CloseCode::is_valid_on_wire(code) {
                return Err(Error::InvalidCloseCode(code));
            }
            let reason = std::str::from_utf8(&payload[2..])?.to_string();
            Ok((code, reason))
        }
    }
}

/// Clip a close reason so the control frame stays within 125 bytes,
/// respecting UTF-8 boundaries.
fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_close_payload_empty_synthesizes_1005() {
        assert_eq!(parse_close_payload(&[]).unwrap(), (1005, String::new()));
    }

    #[test]
    fn test_parse_close_payload_one_byte_rejected() {
        assert!(matches!(
            parse_close_payload(&[0x03]),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_parse_close_payload_code_and_reason() {
        let mut payload = 1000u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"done");
        assert_eq!(
            parse_close_payload(&payload).unwrap(),
            (1000, "done".to_string())
        );
    }

    #[test]
    fn test_parse_close_payload_reserved_code_rejected() {
        for code in [1004u16, 1005, 1006, 1015, 999, 2999, 5000] {
            let payload = code.to_be_bytes().to_vec();
            assert!(
                matches!(
                    parse_close_payload(&payload),
                    Err(Error::InvalidCloseCode(c)) if c == code
                ),
                "code {code} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_close_payload_invalid_utf8_reason() {
        let mut payload = 1000u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0xC0, 0xAF]);
        assert!(matches!(
            parse_close_payload(&payload),
            Err(Error::InvalidUtf8)
        ));
    }

    #[test]
    fn test_truncate_reason_ascii() {
        let long = "x".repeat(200);
        assert_eq!(truncate_reason(&long).len(), MAX_CLOSE_REASON);
        assert_eq!(truncate_reason("short"), "short");
    }

    #[test]
    fn test_truncate_reason_respects_char_boundary() {
        // 62 two-byte characters put a boundary right at byte 124
        let long = "é".repeat(80);
        let clipped = truncate_reason(&long);
        assert!(clipped.len() <= MAX_CLOSE_REASON);
        assert_eq!(clipped.len() % 2, 0);
    }

    #[test]
    fn test_random_key_varies() {
        // Four bytes collide rarely; two draws matching twice in a row
        // would indicate a broken generator.
        let a = random_key();
        let b = random_key();
        let c = random_key();
        assert!(a != b || b != c);
    }
}
