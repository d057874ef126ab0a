//! NCS instructions.

use crate::opcode::{
    Opcode, PairCode, TypeCode, QUALIFIER_COPY, QUALIFIER_INT, QUALIFIER_NONE, QUALIFIER_STORE_STATE,
};
use crate::stream::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immediate operand of `CONST`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i32),
    Float(f32),
    String(String),
    Object(u32),
}

impl Constant {
    pub fn type_code(&self) -> TypeCode {
        match self {
            Constant::Int(_) => TypeCode::Int,
            Constant::Float(_) => TypeCode::Float,
            Constant::String(_) => TypeCode::String,
            Constant::Object(_) => TypeCode::Object,
        }
    }
}

/// Binary operators (pop two operands, push one result).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOpcode {
    LogAnd,
    LogOr,
    IncOr,
    ExcOr,
    BoolAnd,
    Equal,
    NEqual,
    Geq,
    Gt,
    Lt,
    Leq,
    ShLeft,
    ShRight,
    UShRight,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOpcode {
    pub fn opcode(self) -> Opcode {
        match self {
            BinaryOpcode::LogAnd => Opcode::LogAnd,
            BinaryOpcode::LogOr => Opcode::LogOr,
            BinaryOpcode::IncOr => Opcode::IncOr,
            BinaryOpcode::ExcOr => Opcode::ExcOr,
            BinaryOpcode::BoolAnd => Opcode::BoolAnd,
            BinaryOpcode::Equal => Opcode::Equal,
            BinaryOpcode::NEqual => Opcode::NEqual,
            BinaryOpcode::Geq => Opcode::Geq,
            BinaryOpcode::Gt => Opcode::Gt,
            BinaryOpcode::Lt => Opcode::Lt,
            BinaryOpcode::Leq => Opcode::Leq,
            BinaryOpcode::ShLeft => Opcode::ShLeft,
            BinaryOpcode::ShRight => Opcode::ShRight,
            BinaryOpcode::UShRight => Opcode::UShRight,
            BinaryOpcode::Add => Opcode::Add,
            BinaryOpcode::Sub => Opcode::Sub,
            BinaryOpcode::Mul => Opcode::Mul,
            BinaryOpcode::Div => Opcode::Div,
            BinaryOpcode::Mod => Opcode::Mod,
        }
    }

    pub fn from_opcode(opcode: Opcode) -> Option<BinaryOpcode> {
        let op = match opcode {
            Opcode::LogAnd => BinaryOpcode::LogAnd,
            Opcode::LogOr => BinaryOpcode::LogOr,
            Opcode::IncOr => BinaryOpcode::IncOr,
            Opcode::ExcOr => BinaryOpcode::ExcOr,
            Opcode::BoolAnd => BinaryOpcode::BoolAnd,
            Opcode::Equal => BinaryOpcode::Equal,
            Opcode::NEqual => BinaryOpcode::NEqual,
            Opcode::Geq => BinaryOpcode::Geq,
            Opcode::Gt => BinaryOpcode::Gt,
            Opcode::Lt => BinaryOpcode::Lt,
            Opcode::Leq => BinaryOpcode::Leq,
            Opcode::ShLeft => BinaryOpcode::ShLeft,
            Opcode::ShRight => BinaryOpcode::ShRight,
            Opcode::UShRight => BinaryOpcode::UShRight,
            Opcode::Add => BinaryOpcode::Add,
            Opcode::Sub => BinaryOpcode::Sub,
            Opcode::Mul => BinaryOpcode::Mul,
            Opcode::Div => BinaryOpcode::Div,
            Opcode::Mod => BinaryOpcode::Mod,
            _ => return None,
        };
        Some(op)
    }
}

/// Unary operators (pop one operand, push one result).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOpcode {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Comp,
    /// Logical not.
    Not,
}

impl UnaryOpcode {
    pub fn opcode(self) -> Opcode {
        match self {
            UnaryOpcode::Neg => Opcode::Neg,
            UnaryOpcode::Comp => Opcode::Comp,
            UnaryOpcode::Not => Opcode::Not,
        }
    }
}

/// Jump-class instructions; the only ones whose operand is patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpKind {
    Jmp,
    Jsr,
    Jz,
    Jnz,
}

impl JumpKind {
    pub fn opcode(self) -> Opcode {
        match self {
            JumpKind::Jmp => Opcode::Jmp,
            JumpKind::Jsr => Opcode::Jsr,
            JumpKind::Jz => Opcode::Jz,
            JumpKind::Jnz => Opcode::Jnz,
        }
    }
}

/// A single NCS instruction.
///
/// Stack offsets are in bytes and negative (relative to the top of stack
/// for `*SP` forms, to the saved base pointer for `*BP` forms). Sizes are in
/// bytes. Jump targets are instruction positions; the encoder converts them
/// to byte offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Copy the top `size` bytes down to `offset` (stack unchanged).
    CpDownSp { offset: i32, size: u16 },
    /// Reserve one zero-initialized cell of the given type.
    RsAdd(TypeCode),
    /// Push a copy of `size` bytes found at `offset`.
    CpTopSp { offset: i32, size: u16 },
    Const(Constant),
    /// Call engine routine `routine` with `argc` arguments.
    Action { routine: u16, argc: u8 },
    Binary { op: BinaryOpcode, operands: PairCode },
    Unary { op: UnaryOpcode, operand: TypeCode },
    /// Pop `-offset` bytes.
    MovSp { offset: i32 },
    Jump { kind: JumpKind, target: Position },
    Retn,
    /// Pop `size` bytes, keeping `keep_size` bytes that start `keep_offset`
    /// bytes into the popped block.
    Destruct {
        size: u16,
        keep_offset: u16,
        keep_size: u16,
    },
    DecISp { offset: i32 },
    IncISp { offset: i32 },
    CpDownBp { offset: i32, size: u16 },
    CpTopBp { offset: i32, size: u16 },
    DecIBp { offset: i32 },
    IncIBp { offset: i32 },
    SaveBp,
    RestoreBp,
    /// Capture `bp_size` bytes of globals and `sp_size` bytes of locals for a
    /// deferred action whose code follows the next instruction.
    StoreState { bp_size: u32, sp_size: u32 },
    Nop,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::CpDownSp { .. } => Opcode::CpDownSp,
            Instruction::RsAdd(_) => Opcode::RsAdd,
            Instruction::CpTopSp { .. } => Opcode::CpTopSp,
            Instruction::Const(_) => Opcode::Const,
            Instruction::Action { .. } => Opcode::Action,
            Instruction::Binary { op, .. } => op.opcode(),
            Instruction::Unary { op, .. } => op.opcode(),
            Instruction::MovSp { .. } => Opcode::MovSp,
            Instruction::Jump { kind, .. } => kind.opcode(),
            Instruction::Retn => Opcode::Retn,
            Instruction::Destruct { .. } => Opcode::Destruct,
            Instruction::DecISp { .. } => Opcode::DecISp,
            Instruction::IncISp { .. } => Opcode::IncISp,
            Instruction::CpDownBp { .. } => Opcode::CpDownBp,
            Instruction::CpTopBp { .. } => Opcode::CpTopBp,
            Instruction::DecIBp { .. } => Opcode::DecIBp,
            Instruction::IncIBp { .. } => Opcode::IncIBp,
            Instruction::SaveBp => Opcode::SaveBp,
            Instruction::RestoreBp => Opcode::RestoreBp,
            Instruction::StoreState { .. } => Opcode::StoreState,
            Instruction::Nop => Opcode::Nop,
        }
    }

    pub fn qualifier(&self) -> u8 {
        match self {
            Instruction::CpDownSp { .. }
            | Instruction::CpTopSp { .. }
            | Instruction::CpDownBp { .. }
            | Instruction::CpTopBp { .. }
            | Instruction::Destruct { .. } => QUALIFIER_COPY,
            Instruction::RsAdd(code) => code.byte(),
            Instruction::Const(constant) => constant.type_code().byte(),
            Instruction::Binary { operands, .. } => operands.byte(),
            Instruction::Unary { operand, .. } => operand.byte(),
            Instruction::DecISp { .. }
            | Instruction::IncISp { .. }
            | Instruction::DecIBp { .. }
            | Instruction::IncIBp { .. } => QUALIFIER_INT,
            Instruction::StoreState { .. } => QUALIFIER_STORE_STATE,
            Instruction::Action { .. }
            | Instruction::MovSp { .. }
            | Instruction::Jump { .. }
            | Instruction::Retn
            | Instruction::SaveBp
            | Instruction::RestoreBp
            | Instruction::Nop => QUALIFIER_NONE,
        }
    }

    /// Encoded size in bytes, including the opcode and qualifier.
    pub fn encoded_len(&self) -> u32 {
        match self {
            Instruction::CpDownSp { .. }
            | Instruction::CpTopSp { .. }
            | Instruction::CpDownBp { .. }
            | Instruction::CpTopBp { .. }
            | Instruction::Destruct { .. } => 8,
            Instruction::Const(Constant::String(value)) => 4 + value.len() as u32,
            Instruction::Const(_) => 6,
            Instruction::Action { .. } => 5,
            Instruction::Binary {
                operands: PairCode::StructStruct(_),
                ..
            } => 4,
            Instruction::MovSp { .. }
            | Instruction::Jump { .. }
            | Instruction::DecISp { .. }
            | Instruction::IncISp { .. }
            | Instruction::DecIBp { .. }
            | Instruction::IncIBp { .. } => 6,
            Instruction::StoreState { .. } => 10,
            Instruction::RsAdd(_)
            | Instruction::Binary { .. }
            | Instruction::Unary { .. }
            | Instruction::Retn
            | Instruction::SaveBp
            | Instruction::RestoreBp
            | Instruction::Nop => 2,
        }
    }

    /// Mnemonic with its type suffix, e.g. `ADDIF`, `RSADDS`, `EQUALTT`.
    pub fn mnemonic(&self) -> String {
        let base = self.opcode().mnemonic();
        match self {
            Instruction::RsAdd(code) | Instruction::Unary { operand: code, .. } => {
                format!("{base}{}", code.suffix())
            }
            Instruction::Const(constant) => format!("{base}{}", constant.type_code().suffix()),
            Instruction::Binary { operands, .. } => format!("{base}{}", operands.suffix()),
            _ => base.to_string(),
        }
    }

    pub fn jump_target(&self) -> Option<Position> {
        match self {
            Instruction::Jump { target, .. } => Some(*target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic())?;
        match self {
            Instruction::CpDownSp { offset, size }
            | Instruction::CpTopSp { offset, size }
            | Instruction::CpDownBp { offset, size }
            | Instruction::CpTopBp { offset, size } => write!(f, " {offset}, {size}"),
            Instruction::Const(Constant::Int(value)) => write!(f, " {value}"),
            Instruction::Const(Constant::Float(value)) => write!(f, " {value:?}"),
            Instruction::Const(Constant::String(value)) => write!(f, " {value:?}"),
            Instruction::Const(Constant::Object(value)) => write!(f, " {value:#x}"),
            Instruction::Action { routine, argc } => write!(f, " {routine}, {argc}"),
            Instruction::Binary {
                operands: PairCode::StructStruct(size),
                ..
            } => write!(f, " {size}"),
            Instruction::MovSp { offset }
            | Instruction::DecISp { offset }
            | Instruction::IncISp { offset }
            | Instruction::DecIBp { offset }
            | Instruction::IncIBp { offset } => write!(f, " {offset}"),
            Instruction::Jump { target, .. } => write!(f, " {target}"),
            Instruction::Destruct {
                size,
                keep_offset,
                keep_size,
            } => write!(f, " {size}, {keep_offset}, {keep_size}"),
            Instruction::StoreState { bp_size, sp_size } => write!(f, " {bp_size}, {sp_size}"),
            Instruction::RsAdd(_)
            | Instruction::Binary { .. }
            | Instruction::Unary { .. }
            | Instruction::Retn
            | Instruction::SaveBp
            | Instruction::RestoreBp
            | Instruction::Nop => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_lengths() {
        assert_eq!(Instruction::CpTopSp { offset: -4, size: 4 }.encoded_len(), 8);
        assert_eq!(Instruction::RsAdd(TypeCode::Int).encoded_len(), 2);
        assert_eq!(Instruction::Const(Constant::Int(1)).encoded_len(), 6);
        assert_eq!(Instruction::Const(Constant::String("abc".into())).encoded_len(), 7);
        assert_eq!(Instruction::Action { routine: 1, argc: 1 }.encoded_len(), 5);
        assert_eq!(
            Instruction::Binary {
                op: BinaryOpcode::Equal,
                operands: PairCode::StructStruct(12)
            }
            .encoded_len(),
            4
        );
        assert_eq!(Instruction::StoreState { bp_size: 0, sp_size: 0 }.encoded_len(), 10);
    }

    #[test]
    fn test_mnemonics() {
        let add = Instruction::Binary {
            op: BinaryOpcode::Add,
            operands: PairCode::IntFloat,
        };
        assert_eq!(add.mnemonic(), "ADDIF");
        assert_eq!(Instruction::RsAdd(TypeCode::String).to_string(), "RSADDS");
        assert_eq!(Instruction::Const(Constant::Int(5)).to_string(), "CONSTI 5");
        assert_eq!(
            Instruction::CpTopSp { offset: -8, size: 4 }.to_string(),
            "CPTOPSP -8, 4"
        );
    }
}
