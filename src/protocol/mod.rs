//! Wire-level protocol primitives: framing, masking, UTF-8 validation and
//! message assembly.

pub mod assembler;
pub mod frame;
pub mod mask;
pub mod opcode;
pub mod utf8;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use frame::Frame;
pub use mask::apply_mask;
pub use opcode::OpCode;
pub use utf8::{validate_utf8, Utf8Validator};
