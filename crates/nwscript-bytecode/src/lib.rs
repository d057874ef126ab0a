//! NCS bytecode.
//!
//! The instruction set of the NWScript stack machine, the growable
//! [`InstructionStream`] that lowering writes into, and the binary NCS
//! encoding of finished [`Program`]s.
//!
//! # Layout
//!
//! - [`opcode`] - opcode bytes and type qualifiers
//! - [`instruction`] - the [`Instruction`] enum and its encoded sizes
//! - [`stream`] - append / reserve / patch / finalize
//! - [`ncs`] - big-endian encoder and decoder
//! - [`listing`] - disassembly text

pub mod instruction;
pub mod listing;
pub mod ncs;
pub mod opcode;
pub mod stream;

pub use instruction::{BinaryOpcode, Constant, Instruction, JumpKind, UnaryOpcode};
pub use listing::listing;
pub use ncs::{DecodeError, EncodeError};
pub use opcode::{Opcode, PairCode, TypeCode};
pub use stream::{InstructionStream, Position, Program, StreamError};

impl Program {
    /// Encode to NCS bytes.
    pub fn to_ncs(&self) -> Result<Vec<u8>, EncodeError> {
        ncs::encode(self)
    }

    /// Decode NCS bytes.
    pub fn from_ncs(bytes: &[u8]) -> Result<Program, DecodeError> {
        ncs::decode(bytes)
    }
}
