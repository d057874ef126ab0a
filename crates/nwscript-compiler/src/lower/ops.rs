//! Binary operator selection by operand kinds.
//!
//! | operator              | operand kinds                       |
//! |-----------------------|-------------------------------------|
//! | `+`                   | II IF FI FF SS VV                   |
//! | `-`                   | II IF FI FF VV                      |
//! | `*`                   | II IF FI FF VF FV                   |
//! | `/`                   | II IF FI FF VF                      |
//! | `%` `&` `\|` `^` shifts | II                                |
//! | `==` `!=`             | II FF SS OO, same engine type, same struct, VV |
//! | `<` `<=` `>` `>=`     | II FF                               |

use crate::structs::StructTable;
use nwscript_ast::BinaryOp;
use nwscript_bytecode::{BinaryOpcode, PairCode};
use nwscript_types::{Kind, SLOT_BYTES};

/// Opcode, operand qualifier and result kind for `left op right`, or `None`
/// when the operator does not apply to those kinds.
pub(super) fn select(
    op: BinaryOp,
    left: &Kind,
    right: &Kind,
    structs: &StructTable,
) -> Option<(BinaryOpcode, PairCode, Kind)> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, left, right),
        BinaryOp::Mod => integral(BinaryOpcode::Mod, left, right),
        BinaryOp::BitAnd => integral(BinaryOpcode::BoolAnd, left, right),
        BinaryOp::BitOr => integral(BinaryOpcode::IncOr, left, right),
        BinaryOp::BitXor => integral(BinaryOpcode::ExcOr, left, right),
        BinaryOp::Shl => integral(BinaryOpcode::ShLeft, left, right),
        BinaryOp::Shr => integral(BinaryOpcode::ShRight, left, right),
        BinaryOp::UShr => integral(BinaryOpcode::UShRight, left, right),
        BinaryOp::And => integral(BinaryOpcode::LogAnd, left, right),
        BinaryOp::Or => integral(BinaryOpcode::LogOr, left, right),
        BinaryOp::Eq => equality(BinaryOpcode::Equal, left, right, structs),
        BinaryOp::Ne => equality(BinaryOpcode::NEqual, left, right, structs),
        BinaryOp::Lt => ordering(BinaryOpcode::Lt, left, right),
        BinaryOp::Le => ordering(BinaryOpcode::Leq, left, right),
        BinaryOp::Gt => ordering(BinaryOpcode::Gt, left, right),
        BinaryOp::Ge => ordering(BinaryOpcode::Geq, left, right),
    }
}

fn arithmetic(op: BinaryOp, left: &Kind, right: &Kind) -> Option<(BinaryOpcode, PairCode, Kind)> {
    let opcode = match op {
        BinaryOp::Add => BinaryOpcode::Add,
        BinaryOp::Sub => BinaryOpcode::Sub,
        BinaryOp::Mul => BinaryOpcode::Mul,
        _ => BinaryOpcode::Div,
    };
    let (operands, result) = match (left, right) {
        (Kind::Int, Kind::Int) => (PairCode::IntInt, Kind::Int),
        (Kind::Int, Kind::Float) => (PairCode::IntFloat, Kind::Float),
        (Kind::Float, Kind::Int) => (PairCode::FloatInt, Kind::Float),
        (Kind::Float, Kind::Float) => (PairCode::FloatFloat, Kind::Float),
        (Kind::String, Kind::String) if op == BinaryOp::Add => (PairCode::StringString, Kind::String),
        (Kind::Vector, Kind::Vector) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
            (PairCode::VectorVector, Kind::Vector)
        }
        (Kind::Vector, Kind::Float) if matches!(op, BinaryOp::Mul | BinaryOp::Div) => {
            (PairCode::VectorFloat, Kind::Vector)
        }
        (Kind::Float, Kind::Vector) if op == BinaryOp::Mul => (PairCode::FloatVector, Kind::Vector),
        _ => return None,
    };
    Some((opcode, operands, result))
}

fn integral(opcode: BinaryOpcode, left: &Kind, right: &Kind) -> Option<(BinaryOpcode, PairCode, Kind)> {
    (*left == Kind::Int && *right == Kind::Int).then_some((opcode, PairCode::IntInt, Kind::Int))
}

fn equality(
    opcode: BinaryOpcode,
    left: &Kind,
    right: &Kind,
    structs: &StructTable,
) -> Option<(BinaryOpcode, PairCode, Kind)> {
    if left != right {
        return None;
    }
    let operands = match left {
        Kind::Int => PairCode::IntInt,
        Kind::Float => PairCode::FloatFloat,
        Kind::String => PairCode::StringString,
        Kind::Object => PairCode::ObjectObject,
        Kind::Engine(engine) => PairCode::EngineEngine(*engine),
        Kind::Vector | Kind::Struct(_) => {
            let width = structs.width(left).ok()?;
            PairCode::StructStruct((width as i32 * SLOT_BYTES) as u16)
        }
        Kind::Void | Kind::Action => return None,
    };
    Some((opcode, operands, Kind::Int))
}

fn ordering(opcode: BinaryOpcode, left: &Kind, right: &Kind) -> Option<(BinaryOpcode, PairCode, Kind)> {
    let operands = match (left, right) {
        (Kind::Int, Kind::Int) => PairCode::IntInt,
        (Kind::Float, Kind::Float) => PairCode::FloatFloat,
        _ => return None,
    };
    Some((opcode, operands, Kind::Int))
}
