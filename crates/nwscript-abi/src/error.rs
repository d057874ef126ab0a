//! Errors raised by routine lookup, argument validation and table loading.

use nwscript_types::Kind;
use thiserror::Error;

/// Engine-call ABI errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbiError {
    /// No routine with this name exists in the table.
    #[error("unknown engine function `{0}`")]
    UnknownEngineFunction(String),

    /// A supplied argument cannot be passed for the parameter at `position`,
    /// even after `int → float` widening.
    #[error("argument {position} of `{routine}` expects {expected}, found {found}")]
    ArgumentKindMismatch {
        routine: String,
        position: usize,
        expected: Kind,
        found: Kind,
    },

    /// Too many arguments, or too few to reach the defaulted tail.
    #[error("`{routine}` takes {min}..={max} arguments, {found} supplied")]
    ArityMismatch {
        routine: String,
        min: usize,
        max: usize,
        found: usize,
    },

    /// Malformed `nwscript.nss` declaration file.
    #[error("line {line}: {message}")]
    Declaration { line: usize, message: String },
}
