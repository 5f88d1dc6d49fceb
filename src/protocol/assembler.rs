//! Reassembly of fragmented messages.
//!
//! At most one message is in flight per connection. A fragmented message
//! starts with a text or binary frame with FIN = 0 and is extended by
//! continuation frames; control frames may be interleaved and do not
//! disturb assembly.

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::frame::Frame;
use crate::protocol::opcode::OpCode;
use crate::protocol::utf8::Utf8Validator;

/// Coalesces data frames into whole messages.
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    utf8: Option<Utf8Validator>,
    max_message_size: usize,
}

impl MessageAssembler {
    /// Create an assembler enforcing `max_message_size`.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            utf8: None,
            max_message_size,
        }
    }

    /// Feed a data frame.
    ///
    /// Returns `Ok(Some(message))` when the frame completes a message,
    /// `Ok(None)` while assembly continues. Control frames are ignored.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` on a continuation with no message in
    ///   progress, or a text/binary frame while one is in progress
    /// - `Error::MessageTooLarge` when the accumulated size exceeds the cap
    /// - `Error::InvalidUtf8` when a text fragment breaks UTF-8 validity
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::ProtocolViolation(
                    "continuation frame with no message in progress".into(),
                ));
            }
        } else {
            if self.opcode.is_some() {
                return Err(Error::ProtocolViolation(
                    "new data frame while a fragmented message is in progress".into(),
                ));
            }
            self.opcode = Some(frame.opcode);
            if frame.opcode == OpCode::Text {
                self.utf8 = Some(Utf8Validator::new());
            }
        }

        let new_size = self.buffer.len() + frame.payload().len();
        if new_size > self.max_message_size {
            return Err(Error::MessageTooLarge {
                size: new_size,
                max: self.max_message_size,
            });
        }

        if let Some(validator) = &mut self.utf8 {
            validator.feed(frame.payload(), frame.fin)?;
        }

        self.buffer.extend_from_slice(frame.payload());

        if frame.fin {
            let payload = self.buffer.split().to_vec();
            let opcode = self.opcode.take().expect("assembly opcode is set");
            self.utf8 = None;
            Ok(Some(AssembledMessage { opcode, payload }))
        } else {
            Ok(None)
        }
    }

    /// Returns `true` while a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Abandon any message in progress.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
        self.utf8 = None;
    }
}

/// A fully reassembled message.
pub struct AssembledMessage {
    /// Opcode of the initial frame (`Text` or `Binary`).
    pub opcode: OpCode,
    /// The concatenated payload.
    pub payload: Vec<u8>,
}

impl AssembledMessage {
    /// Convert into the embedder-facing [`Message`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if a text payload is not valid UTF-8.
    /// Text payloads are already validated incrementally during assembly,
    /// so this only fails for messages constructed by hand.
    pub fn into_message(self) -> Result<Message> {
        match self.opcode {
            OpCode::Text => String::from_utf8(self.payload)
                .map(Message::Text)
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Message::Binary(self.payload)),
        }
    }
}
