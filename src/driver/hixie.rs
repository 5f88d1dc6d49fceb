//! Driver state machine for the Hixie-75 and Hixie-76 wire formats.
//!
//! Hixie framing brackets UTF-8 text between `0x00` and `0xFF`; a first
//! byte with the high bit set starts a length-prefixed frame whose payload
//! is discarded. The marker pair `0xFF 0x00` is the close signal. Binary
//! messages and pings do not exist in these drafts, and there is no close
//! handshake: a local `close()` terminates immediately.

use log::{debug, trace};

use crate::buffer::ByteBuffer;
use crate::config::Config;
use crate::driver::queue::{OutboundQueue, Queued};
use crate::driver::state::ReadyState;
use crate::error::Error;
use crate::event::{Event, Handler};
use crate::handshake::hixie::{
    hixie75_protocols, hixie75_response, Hixie76Handshake, CHALLENGE_BODY_LEN,
};
use crate::handshake::request::RequestContext;
use crate::handshake::select_protocol;
use crate::message::Message;

/// Wire close signal: a length frame of type `0xFF` with length 0.
const CLOSE_SIGNAL: [u8; 2] = [0xFF, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HixieVersion {
    V75,
    V76,
}

/// Handshake progress, consumed as the driver advances.
enum Phase {
    /// Hixie-75: complete response ready for `start()`.
    Ready75 { response: Vec<u8> },
    /// Hixie-76: header block ready, challenge pending the 8-byte body.
    Ready76 {
        head: Vec<u8>,
        challenge: Hixie76Handshake,
    },
    /// Hixie-76: header block written, waiting for the body.
    AwaitBody { challenge: Hixie76Handshake },
    /// The request failed validation; surfaced by `start()`.
    Invalid(Error),
    Done,
}

pub(crate) struct Hixie {
    version: HixieVersion,
    state: ReadyState,
    config: Config,
    buffer: ByteBuffer,
    queue: OutboundQueue,
    protocol: String,
    url: String,
    phase: Phase,
}

impl Hixie {
    pub fn hixie75(ctx: &RequestContext, config: Config) -> Self {
        let selected = select_protocol(&hixie75_protocols(ctx), &config.protocols);
        let response = hixie75_response(ctx, selected.as_deref());
        Self {
            version: HixieVersion::V75,
            state: ReadyState::Connecting,
            buffer: ByteBuffer::new(),
            queue: OutboundQueue::new(),
            protocol: selected.unwrap_or_default(),
            url: ctx.url(),
            phase: Phase::Ready75 { response },
            config,
        }
    }

    pub fn hixie76(ctx: &RequestContext, config: Config) -> Self {
        let mut protocol = String::new();
        let phase = match Hixie76Handshake::parse(ctx) {
            Ok(challenge) => {
                let selected = challenge.negotiate(&config.protocols);
                let head = challenge.response_head(selected.as_deref());
                protocol = selected.unwrap_or_default();
                Phase::Ready76 { head, challenge }
            }
            Err(error) => Phase::Invalid(error),
        };
        Self {
            version: HixieVersion::V76,
            state: ReadyState::Connecting,
            buffer: ByteBuffer::new(),
            queue: OutboundQueue::new(),
            protocol,
            url: ctx.url(),
            phase,
            config,
        }
    }

    pub fn start<H: Handler>(&mut self, handler: &mut H) -> bool {
        if self.state != ReadyState::Connecting {
            return false;
        }
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Ready75 { response } => {
                handler.write(&response);
                self.open(handler);
                self.drive(handler);
                true
            }
            Phase::Ready76 { head, challenge } => {
                handler.write(&head);
                self.phase = Phase::AwaitBody { challenge };
                self.drive(handler);
                true
            }
            Phase::Invalid(error) => {
                self.fail(error, handler);
                false
            }
            phase @ (Phase::AwaitBody { .. } | Phase::Done) => {
                self.phase = phase;
                false
            }
        }
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
                self.write_text(string, handler);
                true
            }
            _ => {
                self.queue.push(Queued::Text(string.to_string()));
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
        if self.state != ReadyState::Open {
            return false;
        }
        debug!("closing {} connection locally", self.version_str());
        if self.version == HixieVersion::V76 {
            handler.write(&CLOSE_SIGNAL);
        }
        self.state = ReadyState::Closed;
        self.buffer.clear();
        handler.event(Event::Close {
            code: code.unwrap_or(1000),
            reason: reason.to_string(),
        });
        true
    }

    pub fn version_str(&self) -> &'static str {
        match self.version {
            HixieVersion::V75 => "hixie-75",
            HixieVersion::V76 => "hixie-76",
        }
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

    fn drive<H: Handler>(&mut self, handler: &mut H) {
        loop {
            match self.state {
                ReadyState::Connecting => {
                    if !self.drive_body(handler) {
                        return;
                    }
                }
                ReadyState::Open => {
                    if !self.parse_frame(handler) {
                        return;
                    }
                }
                _ => {
                    self.buffer.clear();
                    return;
                }
            }
        }
    }

    /// Hixie-76 phase (b): once the 8-byte body is buffered, emit the
    /// 16-byte challenge digest and open.
    fn drive_body<H: Handler>(&mut self, handler: &mut H) -> bool {
        if !matches!(self.phase, Phase::AwaitBody { .. }) {
            // Header phase not finished; bytes wait for start().
            return false;
        }
        let Some(body) = self.buffer.read(CHALLENGE_BODY_LEN) else {
            return false;
        };
        let body: [u8; CHALLENGE_BODY_LEN] = body.try_into().expect("read returned 8 bytes");
        let Phase::AwaitBody { challenge } = std::mem::replace(&mut self.phase, Phase::Done)
        else {
            unreachable!("phase checked above");
        };
        handler.write(&challenge.signature(&body));
        self.open(handler);
        true
    }

    /// Decode one frame. Returns `false` when input is exhausted or the
    /// connection left the open state.
    fn parse_frame<H: Handler>(&mut self, handler: &mut H) -> bool {
        let Some(&first) = self.buffer.as_slice().first() else {
            return false;
        };

        if first & 0x80 == 0 {
            // Text frame: type byte, payload, 0xFF terminator.
            let Some(chunk) = self.buffer.read_until(&[0xFF]) else {
                if self.buffer.len() > self.config.limits.max_frame_size {
                    self.fail(
                        Error::FrameTooLarge {
                            size: self.buffer.len() as u64,
                            max: self.config.limits.max_frame_size,
                        },
                        handler,
                    );
                }
                return false;
            };
            let payload = &chunk[1..chunk.len() - 1];
            match std::str::from_utf8(payload) {
                Ok(text) => {
                    trace!("text frame: len={}", text.len());
                    handler.event(Event::Message(Message::Text(text.to_string())));
                    true
                }
                Err(_) => {
                    self.fail(Error::InvalidUtf8, handler);
                    false
                }
            }
        } else {
            match scan_length_frame(
                self.buffer.as_slice(),
                self.config.limits.max_frame_size,
            ) {
                LengthScan::Incomplete => false,
                LengthScan::Unterminated => {
                    self.fail(
                        Error::ProtocolViolation("unterminated frame length".into()),
                        handler,
                    );
                    false
                }
                LengthScan::TooLarge(size) => {
                    self.fail(
                        Error::FrameTooLarge {
                            size,
                            max: self.config.limits.max_frame_size,
                        },
                        handler,
                    );
                    false
                }
                LengthScan::Frame {
                    length,
                    header_len,
                    complete,
                } => {
                    // The close signal only exists in the -76 draft; -75
                    // knows nothing but local close and transport EOF.
                    if first == 0xFF && length == 0 && self.version == HixieVersion::V76 {
                        self.buffer.skip(header_len);
                        self.receive_close(handler);
                        return false;
                    }
                    if !complete {
                        return false;
                    }
                    // No binary support in these drafts; the payload is
                    // dropped.
                    trace!("discarding length frame: type={first:#x} len={length}");
                    self.buffer.skip(header_len + length as usize);
                    true
                }
            }
        }
    }

    /// Inbound `0xFF 0x00` on a -76 connection: echo it once and close.
    fn receive_close<H: Handler>(&mut self, handler: &mut H) {
        debug!("received close signal");
        handler.write(&CLOSE_SIGNAL);
        self.state = ReadyState::Closed;
        self.buffer.clear();
        handler.event(Event::Close {
            code: 1000,
            reason: String::new(),
        });
    }

    fn open<H: Handler>(&mut self, handler: &mut H) {
        debug!("connection open: url={} version={}", self.url, self.version_str());
        self.state = ReadyState::Open;
        let queued: Vec<Queued> = self.queue.drain().collect();
        for item in queued {
            if let Queued::Text(string) = item {
                self.write_text(&string, handler);
            }
        }
        handler.event(Event::Open {
            protocol: self.protocol.clone(),
        });
    }

    fn write_text<H: Handler>(&mut self, string: &str, handler: &mut H) {
        let mut out = Vec::with_capacity(string.len() + 2);
        out.push(0x00);
        out.extend_from_slice(string.as_bytes());
        out.push(0xFF);
        handler.write(&out);
    }

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
        // Hixie framing has no close codes, so nothing more goes on the
        // wire; the code only reaches the local close event.
        self.state = ReadyState::Closed;
        self.buffer.clear();
        handler.event(Event::Close {
            code,
            reason: message,
        });
    }
}

/// Outcome of scanning a length frame header.
enum LengthScan {
    /// Varint not finished; wait for more bytes.
    Incomplete,
    /// Continuation bit never cleared within a sane width.
    Unterminated,
    /// Declared length exceeds the frame cap.
    TooLarge(u64),
    /// Header decoded; `complete` is true once the payload is buffered too.
    Frame {
        length: u64,
        header_len: usize,
        complete: bool,
    },
}

fn scan_length_frame(slice: &[u8], max_frame_size: usize) -> LengthScan {
    let mut length: u64 = 0;
    let mut index = 1;
    loop {
        let Some(&byte) = slice.get(index) else {
            return LengthScan::Incomplete;
        };
        index += 1;
        if index > 1 + 9 {
            return LengthScan::Unterminated;
        }
        length = (length << 7) | u64::from(byte & 0x7F);
        if length > max_frame_size as u64 {
            return LengthScan::TooLarge(length);
        }
        if byte & 0x80 == 0 {
            break;
        }
    }
    let total = index as u64 + length;
    LengthScan::Frame {
        length,
        header_len: index,
        complete: slice.len() as u64 >= total,
    }
}
