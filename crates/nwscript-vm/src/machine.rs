//! The interpreter loop.

use crate::error::{Result, VmError};
use crate::host::{Host, HostResult};
use crate::value::{ActionState, Value};
use nwscript_abi::{RoutineDescriptor, RoutineTable};
use nwscript_bytecode::{
    BinaryOpcode, Instruction, JumpKind, PairCode, Position, Program, TypeCode, UnaryOpcode,
};
use nwscript_types::{Kind, SLOT_BYTES};
use std::ops::Range;
use tracing::{debug, instrument, trace, warn};

/// Instructions executed before a run is abandoned.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Final state of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Cells left on the stack by the outermost `RETN`.
    pub stack: Vec<Value>,
    pub steps: u64,
}

impl Outcome {
    /// Result of an `int` entry point: the one cell the program leaves.
    pub fn return_value(&self) -> Option<&Value> {
        self.stack.last()
    }
}

/// Executes one compiled program against a routine table.
#[derive(Debug, Clone)]
pub struct Vm<'p> {
    program: &'p Program,
    table: &'p RoutineTable,
    step_limit: u64,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program, table: &'p RoutineTable) -> Self {
        Self {
            program,
            table,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Run from the first instruction until the outermost `RETN`.
    #[instrument(skip_all, fields(instructions = self.program.len()))]
    pub fn run<H: Host>(&self, host: &mut H) -> Result<Outcome> {
        let machine = Machine {
            stack: Vec::new(),
            bp: 0,
            calls: Vec::new(),
            saved: Vec::new(),
            pc: Position(0),
            steps: 0,
        };
        machine.execute(self, host)
    }

    /// Run a deferred action captured by `STORE_STATE`.
    ///
    /// The saved globals go back under a placeholder for the saved base
    /// pointer, so base-relative offsets compiled for the original frame
    /// still line up.
    #[instrument(skip_all, fields(resume = %state.resume))]
    pub fn run_action<H: Host>(&self, state: &ActionState, host: &mut H) -> Result<Outcome> {
        let mut stack = state.globals.clone();
        stack.push(Value::Int(0));
        let bp = stack.len();
        stack.extend(state.locals.iter().cloned());
        let machine = Machine {
            stack,
            bp,
            calls: Vec::new(),
            saved: Vec::new(),
            pc: state.resume,
            steps: 0,
        };
        machine.execute(self, host)
    }
}

struct Machine {
    stack: Vec<Value>,
    bp: usize,
    calls: Vec<Position>,
    /// Continuations awaiting the `ACTION` that consumes them.
    saved: Vec<ActionState>,
    pc: Position,
    steps: u64,
}

fn cells(bytes: impl Into<i64>) -> i64 {
    bytes.into() / SLOT_BYTES as i64
}

impl Machine {
    fn execute<H: Host>(mut self, vm: &Vm<'_>, host: &mut H) -> Result<Outcome> {
        loop {
            if self.steps >= vm.step_limit {
                return Err(VmError::StepLimit(vm.step_limit));
            }
            self.steps += 1;

            let at = self.pc;
            let instruction = vm.program.get(at).ok_or(VmError::PcOutOfRange(at))?;
            trace!(%at, %instruction, depth = self.stack.len(), "step");
            let mut next = Position(at.0 + 1);

            match instruction {
                Instruction::CpDownSp { offset, size } => {
                    let start = self.stack.len() as i64 + cells(*offset);
                    self.copy_down(at, start, cells(*size), *offset)?;
                }
                Instruction::CpTopSp { offset, size } => {
                    let start = self.stack.len() as i64 + cells(*offset);
                    self.copy_top(at, start, cells(*size), *offset)?;
                }
                Instruction::CpDownBp { offset, size } => {
                    let start = self.bp as i64 + cells(*offset);
                    self.copy_down(at, start, cells(*size), *offset)?;
                }
                Instruction::CpTopBp { offset, size } => {
                    let start = self.bp as i64 + cells(*offset);
                    self.copy_top(at, start, cells(*size), *offset)?;
                }
                Instruction::RsAdd(code) => self.stack.push(Value::default_for(*code)),
                Instruction::Const(constant) => self.stack.push(Value::from(constant)),
                Instruction::Action { routine, argc } => {
                    let descriptor = vm
                        .table
                        .by_id(*routine)
                        .ok_or(VmError::UnknownRoutine { at, id: *routine })?;
                    self.call_host(at, descriptor, *argc as usize, host)?;
                }
                Instruction::Binary { op, operands } => self.binary(at, *op, *operands)?,
                Instruction::Unary { op, operand } => self.unary(at, *op, *operand)?,
                Instruction::MovSp { offset } => {
                    if *offset > 0 {
                        return Err(VmError::BadOffset { at, offset: *offset });
                    }
                    self.pop_cells(at, -cells(*offset))?;
                }
                Instruction::Jump { kind, target } => match kind {
                    JumpKind::Jmp => next = *target,
                    JumpKind::Jsr => {
                        self.calls.push(next);
                        next = *target;
                    }
                    JumpKind::Jz => {
                        if self.pop_int(at)? == 0 {
                            next = *target;
                        }
                    }
                    JumpKind::Jnz => {
                        if self.pop_int(at)? != 0 {
                            next = *target;
                        }
                    }
                },
                Instruction::Retn => match self.calls.pop() {
                    Some(ret) => next = ret,
                    None => {
                        debug!(steps = self.steps, depth = self.stack.len(), "program returned");
                        return Ok(Outcome {
                            stack: self.stack,
                            steps: self.steps,
                        });
                    }
                },
                Instruction::Destruct {
                    size,
                    keep_offset,
                    keep_size,
                } => {
                    let block = self.pop_cells(at, cells(*size))?;
                    let keep = cells(*keep_offset) as usize..(cells(*keep_offset) + cells(*keep_size)) as usize;
                    let kept = block.get(keep).ok_or(VmError::BadOffset {
                        at,
                        offset: i32::from(*keep_offset),
                    })?;
                    self.stack.extend_from_slice(kept);
                }
                Instruction::IncISp { offset } => {
                    let index = self.stack.len() as i64 + cells(*offset);
                    self.step_int(at, index, *offset, 1)?;
                }
                Instruction::DecISp { offset } => {
                    let index = self.stack.len() as i64 + cells(*offset);
                    self.step_int(at, index, *offset, -1)?;
                }
                Instruction::IncIBp { offset } => {
                    let index = self.bp as i64 + cells(*offset);
                    self.step_int(at, index, *offset, 1)?;
                }
                Instruction::DecIBp { offset } => {
                    let index = self.bp as i64 + cells(*offset);
                    self.step_int(at, index, *offset, -1)?;
                }
                Instruction::SaveBp => {
                    self.stack.push(Value::Int(self.bp as i32));
                    self.bp = self.stack.len();
                }
                Instruction::RestoreBp => {
                    let saved = self.pop_int(at)?;
                    self.bp = usize::try_from(saved).map_err(|_| VmError::BadOffset { at, offset: saved })?;
                }
                Instruction::StoreState { bp_size, sp_size } => {
                    let globals = cells(*bp_size);
                    let globals = if globals == 0 {
                        Vec::new()
                    } else {
                        // globals sit just below the saved base pointer cell
                        let end = self.bp as i64 - 1;
                        self.stack[self.range(at, end - globals, globals, *bp_size as i32)?].to_vec()
                    };
                    let locals = cells(*sp_size);
                    let top = self.stack.len() as i64;
                    let locals = self.stack[self.range(at, top - locals, locals, *sp_size as i32)?].to_vec();
                    self.saved.push(ActionState {
                        resume: Position(at.0 + 2),
                        globals,
                        locals,
                    });
                }
                Instruction::Nop => {}
            }
            self.pc = next;
        }
    }

    // === Stack access ===

    /// Cells `start..start + count`, checked against the stack.
    fn range(&self, at: Position, start: i64, count: i64, offset: i32) -> Result<Range<usize>> {
        if start < 0 || count < 0 || start + count > self.stack.len() as i64 {
            return Err(VmError::BadOffset { at, offset });
        }
        Ok(start as usize..(start + count) as usize)
    }

    fn copy_down(&mut self, at: Position, start: i64, count: i64, offset: i32) -> Result<()> {
        let top = self.stack.len() as i64;
        let source = self.range(at, top - count, count, offset)?;
        let target = self.range(at, start, count, offset)?;
        let values = self.stack[source].to_vec();
        self.stack[target].clone_from_slice(&values);
        Ok(())
    }

    fn copy_top(&mut self, at: Position, start: i64, count: i64, offset: i32) -> Result<()> {
        let source = self.range(at, start, count, offset)?;
        self.stack.extend_from_within(source);
        Ok(())
    }

    fn step_int(&mut self, at: Position, index: i64, offset: i32, delta: i32) -> Result<()> {
        let range = self.range(at, index, 1, offset)?;
        match &mut self.stack[range.start] {
            Value::Int(value) => {
                *value = value.wrapping_add(delta);
                Ok(())
            }
            other => Err(VmError::TypeMismatch {
                at,
                expected: "int",
                found: other.to_string(),
            }),
        }
    }

    fn pop(&mut self, at: Position) -> Result<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow { at })
    }

    /// Pop `count` cells, returned in stack order.
    fn pop_cells(&mut self, at: Position, count: i64) -> Result<Vec<Value>> {
        let count = usize::try_from(count).map_err(|_| VmError::StackUnderflow { at })?;
        if count > self.stack.len() {
            return Err(VmError::StackUnderflow { at });
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn pop_int(&mut self, at: Position) -> Result<i32> {
        match self.pop(at)? {
            Value::Int(value) => Ok(value),
            other => Err(mismatch(at, "int", &other)),
        }
    }

    fn pop_float(&mut self, at: Position) -> Result<f32> {
        match self.pop(at)? {
            Value::Float(value) => Ok(value),
            other => Err(mismatch(at, "float", &other)),
        }
    }

    fn pop_string(&mut self, at: Position) -> Result<String> {
        match self.pop(at)? {
            Value::String(value) => Ok(value),
            other => Err(mismatch(at, "string", &other)),
        }
    }

    fn pop_vector(&mut self, at: Position) -> Result<[f32; 3]> {
        let z = self.pop_float(at)?;
        let y = self.pop_float(at)?;
        let x = self.pop_float(at)?;
        Ok([x, y, z])
    }

    fn push_value(&mut self, value: Value) {
        match value {
            Value::Vector(components) => self
                .stack
                .extend(components.into_iter().map(Value::Float)),
            Value::Action(_) => {}
            scalar => self.stack.push(scalar),
        }
    }

    // === Engine calls ===

    fn call_host<H: Host>(
        &mut self,
        at: Position,
        routine: &RoutineDescriptor,
        argc: usize,
        host: &mut H,
    ) -> Result<()> {
        let mut args = Vec::with_capacity(argc);
        for param in routine.params.iter().take(argc) {
            let arg = match param.kind {
                Kind::Action => Value::Action(self.saved.pop().ok_or(VmError::NoSavedState { at })?),
                Kind::Vector => Value::Vector(self.pop_vector(at)?),
                _ => self.pop(at)?,
            };
            args.push(arg);
        }

        match host.call(routine, args) {
            HostResult::Return(value) => {
                if value.kind() != routine.returns {
                    return Err(VmError::HostReturnKind {
                        routine: routine.name.clone(),
                        expected: routine.returns.clone(),
                        found: value.kind(),
                    });
                }
                self.push_value(value);
            }
            HostResult::Void => {
                if routine.returns != Kind::Void {
                    return Err(VmError::HostReturnKind {
                        routine: routine.name.clone(),
                        expected: routine.returns.clone(),
                        found: Kind::Void,
                    });
                }
            }
            HostResult::Unhandled => {
                warn!(routine = %routine.name, id = routine.id, "unhandled engine routine");
                if let Some(value) = Value::default_for_kind(&routine.returns) {
                    self.push_value(value);
                }
            }
        }
        Ok(())
    }

    // === Operators ===

    fn unary(&mut self, at: Position, op: UnaryOpcode, operand: TypeCode) -> Result<()> {
        let value = match (op, operand) {
            (UnaryOpcode::Neg, TypeCode::Int) => Value::Int(self.pop_int(at)?.wrapping_neg()),
            (UnaryOpcode::Neg, TypeCode::Float) => Value::Float(-self.pop_float(at)?),
            (UnaryOpcode::Comp, TypeCode::Int) => Value::Int(!self.pop_int(at)?),
            (UnaryOpcode::Not, TypeCode::Int) => Value::Int((self.pop_int(at)? == 0) as i32),
            _ => {
                return Err(VmError::InvalidOperands {
                    at,
                    mnemonic: format!("{:?}{}", op, operand.suffix()),
                })
            }
        };
        self.stack.push(value);
        Ok(())
    }

    fn binary(&mut self, at: Position, op: BinaryOpcode, operands: PairCode) -> Result<()> {
        let invalid = || VmError::InvalidOperands {
            at,
            mnemonic: format!("{}{}", op.opcode().mnemonic(), operands.suffix()),
        };
        let result = match operands {
            PairCode::IntInt => {
                let right = self.pop_int(at)?;
                let left = self.pop_int(at)?;
                Value::Int(int_op(at, op, left, right).ok_or_else(invalid)??)
            }
            PairCode::IntFloat => {
                let right = self.pop_float(at)?;
                let left = self.pop_int(at)? as f32;
                float_op(at, op, left, right).ok_or_else(invalid)??
            }
            PairCode::FloatInt => {
                let right = self.pop_int(at)? as f32;
                let left = self.pop_float(at)?;
                float_op(at, op, left, right).ok_or_else(invalid)??
            }
            PairCode::FloatFloat => {
                let right = self.pop_float(at)?;
                let left = self.pop_float(at)?;
                float_op(at, op, left, right).ok_or_else(invalid)??
            }
            PairCode::StringString => {
                let right = self.pop_string(at)?;
                let left = self.pop_string(at)?;
                match op {
                    BinaryOpcode::Add => Value::String(left + &right),
                    BinaryOpcode::Equal => Value::Int((left == right) as i32),
                    BinaryOpcode::NEqual => Value::Int((left != right) as i32),
                    _ => return Err(invalid()),
                }
            }
            PairCode::ObjectObject | PairCode::EngineEngine(_) => {
                let right = self.pop(at)?;
                let left = self.pop(at)?;
                equality(op, left == right).ok_or_else(invalid)?
            }
            PairCode::StructStruct(size) => {
                let right = self.pop_cells(at, cells(size))?;
                let left = self.pop_cells(at, cells(size))?;
                equality(op, left == right).ok_or_else(invalid)?
            }
            PairCode::VectorVector => {
                let right = self.pop_vector(at)?;
                let left = self.pop_vector(at)?;
                let combine: fn(f32, f32) -> f32 = match op {
                    BinaryOpcode::Add => |a, b| a + b,
                    BinaryOpcode::Sub => |a, b| a - b,
                    _ => return Err(invalid()),
                };
                Value::Vector([0, 1, 2].map(|i| combine(left[i], right[i])))
            }
            PairCode::VectorFloat => {
                let right = self.pop_float(at)?;
                let left = self.pop_vector(at)?;
                match op {
                    BinaryOpcode::Mul => Value::Vector(left.map(|c| c * right)),
                    BinaryOpcode::Div if right == 0.0 => return Err(VmError::DivisionByZero { at }),
                    BinaryOpcode::Div => Value::Vector(left.map(|c| c / right)),
                    _ => return Err(invalid()),
                }
            }
            PairCode::FloatVector => {
                let right = self.pop_vector(at)?;
                let left = self.pop_float(at)?;
                match op {
                    BinaryOpcode::Mul => Value::Vector(right.map(|c| left * c)),
                    _ => return Err(invalid()),
                }
            }
        };
        self.push_value(result);
        Ok(())
    }
}

fn mismatch(at: Position, expected: &'static str, found: &Value) -> VmError {
    VmError::TypeMismatch {
        at,
        expected,
        found: found.to_string(),
    }
}

fn equality(op: BinaryOpcode, equal: bool) -> Option<Value> {
    match op {
        BinaryOpcode::Equal => Some(Value::Int(equal as i32)),
        BinaryOpcode::NEqual => Some(Value::Int(!equal as i32)),
        _ => None,
    }
}

/// `None` when `op` has no integer form.
fn int_op(at: Position, op: BinaryOpcode, left: i32, right: i32) -> Option<Result<i32>> {
    let value = match op {
        BinaryOpcode::Add => left.wrapping_add(right),
        BinaryOpcode::Sub => left.wrapping_sub(right),
        BinaryOpcode::Mul => left.wrapping_mul(right),
        BinaryOpcode::Div | BinaryOpcode::Mod if right == 0 => {
            return Some(Err(VmError::DivisionByZero { at }))
        }
        BinaryOpcode::Div => left.wrapping_div(right),
        BinaryOpcode::Mod => left.wrapping_rem(right),
        BinaryOpcode::LogAnd => (left != 0 && right != 0) as i32,
        BinaryOpcode::LogOr => (left != 0 || right != 0) as i32,
        BinaryOpcode::IncOr => left | right,
        BinaryOpcode::ExcOr => left ^ right,
        BinaryOpcode::BoolAnd => left & right,
        BinaryOpcode::Equal => (left == right) as i32,
        BinaryOpcode::NEqual => (left != right) as i32,
        BinaryOpcode::Geq => (left >= right) as i32,
        BinaryOpcode::Gt => (left > right) as i32,
        BinaryOpcode::Lt => (left < right) as i32,
        BinaryOpcode::Leq => (left <= right) as i32,
        BinaryOpcode::ShLeft => left.wrapping_shl(right as u32),
        BinaryOpcode::ShRight => left.wrapping_shr(right as u32),
        BinaryOpcode::UShRight => (left as u32).wrapping_shr(right as u32) as i32,
    };
    Some(Ok(value))
}

fn float_op(at: Position, op: BinaryOpcode, left: f32, right: f32) -> Option<Result<Value>> {
    let value = match op {
        BinaryOpcode::Add => Value::Float(left + right),
        BinaryOpcode::Sub => Value::Float(left - right),
        BinaryOpcode::Mul => Value::Float(left * right),
        BinaryOpcode::Div if right == 0.0 => return Some(Err(VmError::DivisionByZero { at })),
        BinaryOpcode::Div => Value::Float(left / right),
        BinaryOpcode::Equal => Value::Int((left == right) as i32),
        BinaryOpcode::NEqual => Value::Int((left != right) as i32),
        BinaryOpcode::Geq => Value::Int((left >= right) as i32),
        BinaryOpcode::Gt => Value::Int((left > right) as i32),
        BinaryOpcode::Lt => Value::Int((left < right) as i32),
        BinaryOpcode::Leq => Value::Int((left <= right) as i32),
        _ => return None,
    };
    Some(Ok(value))
}
