//! Growable instruction buffer with forward-jump patching.
//!
//! Lowering appends instructions in order. A jump whose destination is not
//! emitted yet is [reserved](InstructionStream::reserve) as a placeholder and
//! [patched](InstructionStream::patch) once the destination is known.
//! [`finalize`](InstructionStream::finalize) refuses to produce a program
//! while any placeholder is still open.

use crate::instruction::{Instruction, JumpKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Index of an instruction within a stream or program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position(pub u32);

impl Position {
    /// Placeholder target of a reserved jump.
    pub const UNRESOLVED: Position = Position(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Position::UNRESOLVED {
            f.write_str("@?")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A reserved jump was never patched.
    #[error("jump at {0} was reserved but never patched")]
    UnresolvedJump(Position),
}

/// Instruction buffer owned by one compilation unit.
#[derive(Debug, Default)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    pending: BTreeSet<Position>,
}

impl InstructionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction, returning its position.
    pub fn append(&mut self, instruction: Instruction) -> Position {
        let position = self.next_position();
        tracing::trace!(%position, %instruction, "emit");
        self.instructions.push(instruction);
        position
    }

    /// Append a placeholder jump to be patched later.
    pub fn reserve(&mut self, kind: JumpKind) -> Position {
        let position = self.append(Instruction::Jump {
            kind,
            target: Position::UNRESOLVED,
        });
        self.pending.insert(position);
        position
    }

    /// Point the jump at `at` to `target`.
    ///
    /// # Panics
    ///
    /// Panics if the instruction at `at` is not a jump.
    pub fn patch(&mut self, at: Position, target: Position) {
        debug_assert!(
            target.index() <= self.instructions.len(),
            "patch target {target} beyond end of stream"
        );
        match self.instructions.get_mut(at.index()) {
            Some(Instruction::Jump { target: slot, .. }) => *slot = target,
            other => panic!("attempted to patch non-jump instruction at {at}: {other:?}"),
        }
        self.pending.remove(&at);
    }

    /// Position the next appended instruction will occupy.
    pub fn next_position(&self) -> Position {
        Position(self.instructions.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, position: Position) -> Option<&Instruction> {
        self.instructions.get(position.index())
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Reserved jumps not yet patched.
    pub fn pending(&self) -> impl Iterator<Item = Position> + '_ {
        self.pending.iter().copied()
    }

    /// Finish the stream.
    ///
    /// An unpatched jump is a lowering bug: debug builds assert, release
    /// builds report [`StreamError::UnresolvedJump`].
    pub fn finalize(self) -> Result<Program, StreamError> {
        debug_assert!(
            self.pending.is_empty(),
            "jumps reserved but never patched: {:?}",
            self.pending
        );
        if let Some(&position) = self.pending.iter().next() {
            return Err(StreamError::UnresolvedJump(position));
        }
        Ok(Program {
            instructions: self.instructions,
        })
    }
}

/// A finished program: every jump target is a valid position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, position: Position) -> Option<&Instruction> {
        self.instructions.get(position.index())
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Byte offset of each instruction from the start of the instruction
    /// stream, plus one trailing entry for the end of the stream.
    pub fn byte_offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset = 0u32;
        for instruction in &self.instructions {
            offsets.push(offset);
            offset += instruction.encoded_len();
        }
        offsets.push(offset);
        offsets
    }
}
