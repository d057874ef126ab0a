//! Reference NCS Machine
//!
//! Executes compiled [`Program`](nwscript_bytecode::Program)s so their
//! behaviour can be checked without a game engine.
//!
//! The stack holds 4-byte cells as [`Value`]s. `ACTION` pops the routine's
//! declared arguments (first argument on top), hands them to a [`Host`] and
//! pushes the result. Deferred actions captured by `STORE_STATE` reach the
//! host as [`Value::Action`] and can be run later with [`Vm::run_action`].
//!
//! # Layout
//!
//! - [`machine`] - [`Vm`] and the interpreter loop
//! - [`host`] - the [`Host`] trait for engine routines
//! - [`value`] - runtime values and saved action state
//! - [`error`] - [`VmError`]

pub mod error;
pub mod host;
pub mod machine;
pub mod value;

pub use error::VmError;
pub use host::{Host, HostResult, NullHost};
pub use machine::{Outcome, Vm, DEFAULT_STEP_LIMIT};
pub use value::{ActionState, Value};
