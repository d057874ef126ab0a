//! Compilation diagnostics.
//!
//! Lowering stops at the first error; no program is produced for a unit
//! that fails.

use nwscript_abi::AbiError;
use nwscript_ast::Span;
use nwscript_bytecode::Position;
use nwscript_types::Kind;
use std::fmt;
use thiserror::Error;

/// A fatal compilation error with its source location.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{span}: {kind}")]
pub struct CompileError {
    pub span: Span,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(span: Span, kind: CompileErrorKind) -> Self {
        Self { span, kind }
    }
}

/// Where a kind mismatch was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchSite {
    /// Argument `position` (0-based) of a call to `function`.
    Argument { function: String, position: usize },
    Initializer(String),
    Assignment,
    Return(String),
    Condition,
    /// Operand(s) of the operator with this symbol.
    Operator(&'static str),
    SwitchSubject,
    CaseLabel,
    /// Declared default of a parameter.
    Default(String),
}

impl fmt::Display for MismatchSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchSite::Argument { function, position } => {
                write!(f, "argument {position} of `{function}`")
            }
            MismatchSite::Initializer(name) => write!(f, "initializer of `{name}`"),
            MismatchSite::Assignment => f.write_str("assignment"),
            MismatchSite::Return(function) => write!(f, "return from `{function}`"),
            MismatchSite::Condition => f.write_str("condition"),
            MismatchSite::Operator(symbol) => write!(f, "operator `{symbol}`"),
            MismatchSite::SwitchSubject => f.write_str("switch subject"),
            MismatchSite::CaseLabel => f.write_str("case label"),
            MismatchSite::Default(name) => write!(f, "default of `{name}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileErrorKind {
    /// Name already bound in the same block (or function declared twice).
    #[error("`{0}` is already declared in this scope")]
    DuplicateDeclaration(String),

    #[error("undeclared identifier `{0}`")]
    UndeclaredIdentifier(String),

    #[error("kind mismatch in {site}: expected {expected}, found {found}")]
    KindMismatch {
        site: MismatchSite,
        expected: String,
        found: Kind,
    },

    /// `break` or `continue` with no enclosing loop (or switch, for `break`).
    #[error("`{0}` outside of a loop")]
    BreakContinueOutsideLoop(&'static str),

    #[error("unknown function `{0}`")]
    UnknownEngineFunction(String),

    #[error("internal error: jump at {0} never patched")]
    UnresolvedJump(Position),

    /// Called function was declared but never given a body.
    #[error("`{0}` is called but never defined")]
    UnresolvedForwardCall(String),

    #[error("unknown struct `{0}`")]
    UnknownStruct(String),

    #[error("{kind} has no field `{field}`")]
    UnknownField { kind: Kind, field: String },

    #[error("duplicate case label {0}")]
    DuplicateCaseLabel(String),

    #[error("no entry point: expected one of {0}")]
    MissingEntryPoint(String),

    #[error("entry point `{0}` must return void or int and take no parameters")]
    InvalidEntryPoint(String),

    #[error("expression is not assignable")]
    NotAssignable,

    #[error("`{function}` takes {min}..={max} arguments, {found} supplied")]
    ArityMismatch {
        function: String,
        min: usize,
        max: usize,
        found: usize,
    },

    /// Variables and user function parameters cannot be void or action.
    #[error("`{name}` cannot be declared {kind}")]
    InvalidVariableKind { name: String, kind: Kind },

    /// Prototype and definition disagree.
    #[error("`{0}` does not match its earlier declaration")]
    SignatureMismatch(String),

    #[error("cannot encode program: {0}")]
    Encoding(String),
}

impl CompileErrorKind {
    pub fn at(self, span: Span) -> CompileError {
        CompileError::new(span, self)
    }

    /// Translate an argument validation failure for `function`.
    pub(crate) fn from_abi(function: &str, error: AbiError) -> Self {
        match error {
            AbiError::UnknownEngineFunction(name) => CompileErrorKind::UnknownEngineFunction(name),
            AbiError::ArgumentKindMismatch {
                position,
                expected,
                found,
                ..
            } => CompileErrorKind::KindMismatch {
                site: MismatchSite::Argument {
                    function: function.to_string(),
                    position,
                },
                expected: expected.to_string(),
                found,
            },
            AbiError::ArityMismatch { min, max, found, .. } => CompileErrorKind::ArityMismatch {
                function: function.to_string(),
                min,
                max,
                found,
            },
            AbiError::Declaration { line, message } => {
                CompileErrorKind::Encoding(format!("routine table line {line}: {message}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
