//! Engine routine dispatch.

use crate::value::Value;
use nwscript_abi::RoutineDescriptor;

/// What a host did with an `ACTION`.
#[derive(Debug, Clone, PartialEq)]
pub enum HostResult {
    /// Routine returned a value of its declared kind.
    Return(Value),
    /// Routine ran and returns nothing.
    Void,
    /// The host has no implementation; the VM substitutes a default.
    Unhandled,
}

/// Implements engine routines for the VM.
///
/// `args` are in declaration order: `args[0]` is the first parameter.
pub trait Host {
    fn call(&mut self, routine: &RoutineDescriptor, args: Vec<Value>) -> HostResult;
}

impl<F> Host for F
where
    F: FnMut(&RoutineDescriptor, Vec<Value>) -> HostResult,
{
    fn call(&mut self, routine: &RoutineDescriptor, args: Vec<Value>) -> HostResult {
        self(routine, args)
    }
}

/// Host that implements nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn call(&mut self, _routine: &RoutineDescriptor, _args: Vec<Value>) -> HostResult {
        HostResult::Unhandled
    }
}
