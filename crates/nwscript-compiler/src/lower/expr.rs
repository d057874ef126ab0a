//! Expression lowering.
//!
//! Every routine leaves exactly the value's cells on the stack and records
//! them with `push_temp`, so the depth used for SP-relative offsets always
//! matches what the machine will hold.

use super::{ops, Lowerer};
use crate::error::{CompileErrorKind, MismatchSite, Result};
use crate::scope::{BlockId, Storage};
use nwscript_ast::{AssignOp, BinaryOp, Expr, Span, Spanned, UnaryOp};
use nwscript_bytecode::{BinaryOpcode, Constant, Instruction, JumpKind, PairCode, TypeCode, UnaryOpcode};
use nwscript_types::{ConstValue, Kind, SLOT_BYTES};

/// An assignable location.
#[derive(Debug, Clone)]
pub(super) struct Place {
    pub storage: Storage,
    pub kind: Kind,
    pub width: u32,
}

impl Lowerer<'_> {
    pub(super) fn lower_expr(&mut self, block: BlockId, expr: &Spanned<Expr>) -> Result<Kind> {
        match &expr.node {
            Expr::Literal(value) => {
                self.push_const(block, value);
                Ok(value.kind())
            }
            Expr::Identifier(name) => self.lower_identifier(block, name, expr.span),
            Expr::Unary { op, operand } => self.lower_unary(block, *op, operand, expr.span),
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => self.lower_short_circuit(block, *op, left, right),
            Expr::Binary { op, left, right } => {
                let left_kind = self.lower_expr(block, left)?;
                let right_kind = self.lower_expr(block, right)?;
                self.apply_binary(block, *op, &left_kind, &right_kind, expr.span)
            }
            Expr::Assign { op, target, value } => self.lower_assign(block, *op, target, value, expr.span),
            Expr::Call { function, args } => self.lower_call(block, function, args, expr.span),
            Expr::Field { base, field } => {
                let base_kind = self.lower_expr(block, base)?;
                let (kind, offset, width) = self
                    .structs
                    .field(&base_kind, field)
                    .map_err(|err| err.at(expr.span))?;
                let total = self.width(&base_kind, expr.span)?;
                self.emit(Instruction::Destruct {
                    size: cell_bytes(total),
                    keep_offset: cell_bytes(offset),
                    keep_size: cell_bytes(width),
                });
                self.scope.pop_temp(block, total);
                self.scope.push_temp(block, width);
                Ok(kind)
            }
        }
    }

    /// Lower `expr` where a value of `expected` is required, widening
    /// `int` to `float` when needed.
    pub(super) fn lower_expr_as(
        &mut self,
        block: BlockId,
        expr: &Spanned<Expr>,
        expected: &Kind,
        site: MismatchSite,
    ) -> Result<()> {
        if let (Kind::Float, Expr::Literal(ConstValue::Int(value))) = (expected, &expr.node) {
            self.push_const(block, &ConstValue::Float(*value as f32));
            return Ok(());
        }
        let found = self.lower_expr(block, expr)?;
        if found == *expected {
            return Ok(());
        }
        if expected.widens_from(&found) {
            self.widen_top();
            return Ok(());
        }
        Err(CompileErrorKind::KindMismatch {
            site,
            expected: expected.to_string(),
            found,
        }
        .at(expr.span))
    }

    /// Convert the `int` on top of the stack to `float` in place.
    pub(super) fn widen_top(&mut self) {
        self.emit(Instruction::Const(Constant::Float(0.0)));
        self.emit(Instruction::Binary {
            op: BinaryOpcode::Add,
            operands: PairCode::IntFloat,
        });
    }

    pub(super) fn push_const(&mut self, block: BlockId, value: &ConstValue) {
        for constant in constants(value) {
            self.emit(Instruction::Const(constant));
        }
        self.scope.push_temp(block, value.kind().slot_width().unwrap_or(0));
    }

    fn lower_identifier(&mut self, block: BlockId, name: &str, span: Span) -> Result<Kind> {
        match self.scope.resolve(block, name) {
            Ok((storage, kind)) => {
                let width = self.width(&kind, span)?;
                self.load(block, storage, width);
                Ok(kind)
            }
            Err(err) => {
                let table = self.table;
                match table.constant(name) {
                    Some(value) => {
                        self.push_const(block, value);
                        Ok(value.kind())
                    }
                    None => Err(err.at(span)),
                }
            }
        }
    }

    /// Push a copy of `width` cells at `storage`.
    pub(super) fn load(&mut self, block: BlockId, storage: Storage, width: u32) {
        let offset = self.scope.byte_offset(block, storage);
        let size = cell_bytes(width);
        self.emit(match storage {
            Storage::Stack { .. } => Instruction::CpTopSp { offset, size },
            Storage::Global { .. } => Instruction::CpTopBp { offset, size },
        });
        self.scope.push_temp(block, width);
    }

    /// Copy the top `width` cells into `storage`, leaving them on the stack.
    pub(super) fn store(&mut self, block: BlockId, storage: Storage, width: u32) {
        let offset = self.scope.byte_offset(block, storage);
        let size = cell_bytes(width);
        self.emit(match storage {
            Storage::Stack { .. } => Instruction::CpDownSp { offset, size },
            Storage::Global { .. } => Instruction::CpDownBp { offset, size },
        });
    }

    fn place(&mut self, block: BlockId, expr: &Spanned<Expr>) -> Result<Place> {
        match &expr.node {
            Expr::Identifier(name) => {
                let (storage, kind) = self.scope.resolve(block, name).map_err(|err| {
                    if self.table.constant(name).is_some() {
                        CompileErrorKind::NotAssignable.at(expr.span)
                    } else {
                        err.at(expr.span)
                    }
                })?;
                let width = self.width(&kind, expr.span)?;
                Ok(Place { storage, kind, width })
            }
            Expr::Field { base, field } => {
                let base = self.place(block, base)?;
                let (kind, offset, width) = self
                    .structs
                    .field(&base.kind, field)
                    .map_err(|err| err.at(expr.span))?;
                Ok(Place {
                    storage: base.storage.offset_by(offset),
                    kind,
                    width,
                })
            }
            _ => Err(CompileErrorKind::NotAssignable.at(expr.span)),
        }
    }

    fn lower_assign(
        &mut self,
        block: BlockId,
        op: AssignOp,
        target: &Spanned<Expr>,
        value: &Spanned<Expr>,
        span: Span,
    ) -> Result<Kind> {
        let place = self.place(block, target)?;
        match op.binary() {
            None => self.lower_expr_as(block, value, &place.kind, MismatchSite::Assignment)?,
            Some(binary) => {
                self.load(block, place.storage, place.width);
                let right = self.lower_expr(block, value)?;
                let result = self.apply_binary(block, binary, &place.kind, &right, span)?;
                if result != place.kind {
                    if !place.kind.widens_from(&result) {
                        return Err(CompileErrorKind::KindMismatch {
                            site: MismatchSite::Assignment,
                            expected: place.kind.to_string(),
                            found: result,
                        }
                        .at(span));
                    }
                    self.widen_top();
                }
            }
        }
        self.store(block, place.storage, place.width);
        Ok(place.kind)
    }

    fn lower_unary(&mut self, block: BlockId, op: UnaryOp, operand: &Spanned<Expr>, span: Span) -> Result<Kind> {
        let (opcode, symbol) = match op {
            UnaryOp::Neg => (UnaryOpcode::Neg, "-"),
            UnaryOp::Not => (UnaryOpcode::Not, "!"),
            UnaryOp::BitNot => (UnaryOpcode::Comp, "~"),
            UnaryOp::PreIncrement | UnaryOp::PreDecrement | UnaryOp::PostIncrement | UnaryOp::PostDecrement => {
                return self.lower_step(block, op, operand, span)
            }
        };
        let kind = self.lower_expr(block, operand)?;
        let code = match (&kind, opcode) {
            (Kind::Int, _) => TypeCode::Int,
            (Kind::Float, UnaryOpcode::Neg) => TypeCode::Float,
            _ => {
                let expected = if opcode == UnaryOpcode::Neg { "int or float" } else { "int" };
                return Err(CompileErrorKind::KindMismatch {
                    site: MismatchSite::Operator(symbol),
                    expected: expected.to_string(),
                    found: kind,
                }
                .at(span));
            }
        };
        self.emit(Instruction::Unary {
            op: opcode,
            operand: code,
        });
        Ok(kind)
    }

    /// `++`/`--` on an `int` place, adjusting the variable in place.
    fn lower_step(&mut self, block: BlockId, op: UnaryOp, operand: &Spanned<Expr>, span: Span) -> Result<Kind> {
        let place = self.place(block, operand)?;
        let increment = matches!(op, UnaryOp::PreIncrement | UnaryOp::PostIncrement);
        if place.kind != Kind::Int {
            return Err(CompileErrorKind::KindMismatch {
                site: MismatchSite::Operator(if increment { "++" } else { "--" }),
                expected: Kind::Int.to_string(),
                found: place.kind,
            }
            .at(span));
        }
        if matches!(op, UnaryOp::PreIncrement | UnaryOp::PreDecrement) {
            self.step(block, place.storage, increment);
            self.load(block, place.storage, 1);
        } else {
            self.load(block, place.storage, 1);
            self.step(block, place.storage, increment);
        }
        Ok(Kind::Int)
    }

    fn step(&mut self, block: BlockId, storage: Storage, increment: bool) {
        let offset = self.scope.byte_offset(block, storage);
        self.emit(match (storage, increment) {
            (Storage::Stack { .. }, true) => Instruction::IncISp { offset },
            (Storage::Stack { .. }, false) => Instruction::DecISp { offset },
            (Storage::Global { .. }, true) => Instruction::IncIBp { offset },
            (Storage::Global { .. }, false) => Instruction::DecIBp { offset },
        });
    }

    /// Emit the opcode for `left op right` with both operands already pushed.
    pub(super) fn apply_binary(
        &mut self,
        block: BlockId,
        op: BinaryOp,
        left: &Kind,
        right: &Kind,
        span: Span,
    ) -> Result<Kind> {
        let (opcode, operands, result) = ops::select(op, left, right, &self.structs).ok_or_else(|| {
            CompileErrorKind::KindMismatch {
                site: MismatchSite::Operator(op.symbol()),
                expected: format!("an operand valid with {left}"),
                found: right.clone(),
            }
            .at(span)
        })?;
        let consumed = self.width(left, span)? + self.width(right, span)?;
        let produced = self.width(&result, span)?;
        self.emit(Instruction::Binary { op: opcode, operands });
        self.scope.pop_temp(block, consumed);
        self.scope.push_temp(block, produced);
        Ok(result)
    }

    /// `&&`/`||`: skip the right operand when the left decides the result.
    fn lower_short_circuit(
        &mut self,
        block: BlockId,
        op: BinaryOp,
        left: &Spanned<Expr>,
        right: &Spanned<Expr>,
    ) -> Result<Kind> {
        let (skip_kind, opcode) = match op {
            BinaryOp::And => (JumpKind::Jz, BinaryOpcode::LogAnd),
            _ => (JumpKind::Jnz, BinaryOpcode::LogOr),
        };
        let symbol = op.symbol();
        self.require_int(block, left, symbol)?;
        self.emit(Instruction::CpTopSp {
            offset: -SLOT_BYTES,
            size: SLOT_BYTES as u16,
        });
        let skip = self.stream.reserve(skip_kind);
        self.require_int(block, right, symbol)?;
        self.emit(Instruction::Binary {
            op: opcode,
            operands: PairCode::IntInt,
        });
        self.scope.pop_temp(block, 1);
        let here = self.stream.next_position();
        self.stream.patch(skip, here);
        Ok(Kind::Int)
    }

    fn require_int(&mut self, block: BlockId, expr: &Spanned<Expr>, symbol: &'static str) -> Result<()> {
        let kind = self.lower_expr(block, expr)?;
        if kind != Kind::Int {
            return Err(CompileErrorKind::KindMismatch {
                site: MismatchSite::Operator(symbol),
                expected: Kind::Int.to_string(),
                found: kind,
            }
            .at(expr.span));
        }
        Ok(())
    }
}

/// Byte count of `cells` stack cells, as an instruction operand.
pub(super) fn cell_bytes(cells: u32) -> u16 {
    (cells as i32 * SLOT_BYTES) as u16
}

/// Constants pushed for a literal; a vector is three floats.
fn constants(value: &ConstValue) -> Vec<Constant> {
    match value {
        ConstValue::Int(v) => vec![Constant::Int(*v)],
        ConstValue::Float(v) => vec![Constant::Float(*v)],
        ConstValue::String(v) => vec![Constant::String(v.clone())],
        ConstValue::Object(v) => vec![Constant::Object(*v)],
        ConstValue::Vector(components) => components.iter().map(|c| Constant::Float(*c)).collect(),
    }
}
