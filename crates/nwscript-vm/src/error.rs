//! Execution errors

use nwscript_bytecode::Position;
use nwscript_types::Kind;
use thiserror::Error;

/// VM result type
pub type Result<T> = std::result::Result<T, VmError>;

/// Faults raised while executing a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("{at}: stack underflow")]
    StackUnderflow { at: Position },

    /// A stack- or base-relative offset points outside the stack.
    #[error("{at}: offset {offset} is outside the stack")]
    BadOffset { at: Position, offset: i32 },

    #[error("{at}: expected {expected} cell, found {found}")]
    TypeMismatch {
        at: Position,
        expected: &'static str,
        found: String,
    },

    #[error("{at}: {mnemonic} does not apply to these operands")]
    InvalidOperands { at: Position, mnemonic: String },

    #[error("{at}: division by zero")]
    DivisionByZero { at: Position },

    #[error("{at}: unknown engine routine {id}")]
    UnknownRoutine { at: Position, id: u16 },

    /// `ACTION` wanted a deferred-action argument but no `STORE_STATE` ran.
    #[error("{at}: no saved state for action argument")]
    NoSavedState { at: Position },

    /// The host returned a value of the wrong kind.
    #[error("{routine} returned {found}, declared {expected}")]
    HostReturnKind {
        routine: String,
        expected: Kind,
        found: Kind,
    },

    #[error("execution left the program at {0}")]
    PcOutOfRange(Position),

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),
}
