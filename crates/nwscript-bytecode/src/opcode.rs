//! NCS opcode bytes and type qualifiers.
//!
//! Every NCS instruction starts with an opcode byte and a qualifier byte.
//! For typed instructions the qualifier names the operand kind(s); for the
//! rest it is a fixed tag. Decoding steps the stream using only these two
//! bytes, so the mapping below must stay exact.

use nwscript_types::{EngineType, Kind};
use serde::{Deserialize, Serialize};

/// Opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    CpDownSp = 0x01,
    RsAdd = 0x02,
    CpTopSp = 0x03,
    Const = 0x04,
    Action = 0x05,
    LogAnd = 0x06,
    LogOr = 0x07,
    IncOr = 0x08,
    ExcOr = 0x09,
    BoolAnd = 0x0A,
    Equal = 0x0B,
    NEqual = 0x0C,
    Geq = 0x0D,
    Gt = 0x0E,
    Lt = 0x0F,
    Leq = 0x10,
    ShLeft = 0x11,
    ShRight = 0x12,
    UShRight = 0x13,
    Add = 0x14,
    Sub = 0x15,
    Mul = 0x16,
    Div = 0x17,
    Mod = 0x18,
    Neg = 0x19,
    Comp = 0x1A,
    MovSp = 0x1B,
    Jmp = 0x1D,
    Jsr = 0x1E,
    Jz = 0x1F,
    Retn = 0x20,
    Destruct = 0x21,
    Not = 0x22,
    DecISp = 0x23,
    IncISp = 0x24,
    Jnz = 0x25,
    CpDownBp = 0x26,
    CpTopBp = 0x27,
    DecIBp = 0x28,
    IncIBp = 0x29,
    SaveBp = 0x2A,
    RestoreBp = 0x2B,
    StoreState = 0x2C,
    Nop = 0x2D,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        let opcode = match byte {
            0x01 => CpDownSp,
            0x02 => RsAdd,
            0x03 => CpTopSp,
            0x04 => Const,
            0x05 => Action,
            0x06 => LogAnd,
            0x07 => LogOr,
            0x08 => IncOr,
            0x09 => ExcOr,
            0x0A => BoolAnd,
            0x0B => Equal,
            0x0C => NEqual,
            0x0D => Geq,
            0x0E => Gt,
            0x0F => Lt,
            0x10 => Leq,
            0x11 => ShLeft,
            0x12 => ShRight,
            0x13 => UShRight,
            0x14 => Add,
            0x15 => Sub,
            0x16 => Mul,
            0x17 => Div,
            0x18 => Mod,
            0x19 => Neg,
            0x1A => Comp,
            0x1B => MovSp,
            0x1D => Jmp,
            0x1E => Jsr,
            0x1F => Jz,
            0x20 => Retn,
            0x21 => Destruct,
            0x22 => Not,
            0x23 => DecISp,
            0x24 => IncISp,
            0x25 => Jnz,
            0x26 => CpDownBp,
            0x27 => CpTopBp,
            0x28 => DecIBp,
            0x29 => IncIBp,
            0x2A => SaveBp,
            0x2B => RestoreBp,
            0x2C => StoreState,
            0x2D => Nop,
            _ => return None,
        };
        Some(opcode)
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            CpDownSp => "CPDOWNSP",
            RsAdd => "RSADD",
            CpTopSp => "CPTOPSP",
            Const => "CONST",
            Action => "ACTION",
            LogAnd => "LOGAND",
            LogOr => "LOGOR",
            IncOr => "INCOR",
            ExcOr => "EXCOR",
            BoolAnd => "BOOLAND",
            Equal => "EQUAL",
            NEqual => "NEQUAL",
            Geq => "GEQ",
            Gt => "GT",
            Lt => "LT",
            Leq => "LEQ",
            ShLeft => "SHLEFT",
            ShRight => "SHRIGHT",
            UShRight => "USHRIGHT",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Neg => "NEG",
            Comp => "COMP",
            MovSp => "MOVSP",
            Jmp => "JMP",
            Jsr => "JSR",
            Jz => "JZ",
            Retn => "RETN",
            Destruct => "DESTRUCT",
            Not => "NOT",
            DecISp => "DECISP",
            IncISp => "INCISP",
            Jnz => "JNZ",
            CpDownBp => "CPDOWNBP",
            CpTopBp => "CPTOPBP",
            DecIBp => "DECIBP",
            IncIBp => "INCIBP",
            SaveBp => "SAVEBP",
            RestoreBp => "RESTOREBP",
            StoreState => "STORE_STATE",
            Nop => "NOP",
        }
    }
}

/// Fixed qualifier of `CPDOWNSP`/`CPTOPSP`/`CPDOWNBP`/`CPTOPBP`/`DESTRUCT`.
pub const QUALIFIER_COPY: u8 = 0x01;
/// Fixed qualifier of `INCISP`/`DECISP`/`INCIBP`/`DECIBP` (int only).
pub const QUALIFIER_INT: u8 = 0x03;
/// Fixed qualifier of `STORE_STATE`.
pub const QUALIFIER_STORE_STATE: u8 = 0x10;
/// Qualifier of untyped instructions.
pub const QUALIFIER_NONE: u8 = 0x00;

/// Single-operand type qualifier (`RSADD`, `CONST`, `NEG`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCode {
    Int,
    Float,
    String,
    Object,
    Engine(EngineType),
}

impl TypeCode {
    pub fn byte(self) -> u8 {
        match self {
            TypeCode::Int => 0x03,
            TypeCode::Float => 0x04,
            TypeCode::String => 0x05,
            TypeCode::Object => 0x06,
            TypeCode::Engine(engine) => 0x10 + engine.index(),
        }
    }

    pub fn from_byte(byte: u8) -> Option<TypeCode> {
        let code = match byte {
            0x03 => TypeCode::Int,
            0x04 => TypeCode::Float,
            0x05 => TypeCode::String,
            0x06 => TypeCode::Object,
            0x10..=0x13 => TypeCode::Engine(engine_from_index(byte - 0x10)?),
            _ => return None,
        };
        Some(code)
    }

    /// Type code of a one-slot kind. Vectors, structs, void and action have none.
    pub fn for_kind(kind: &Kind) -> Option<TypeCode> {
        match kind {
            Kind::Int => Some(TypeCode::Int),
            Kind::Float => Some(TypeCode::Float),
            Kind::String => Some(TypeCode::String),
            Kind::Object => Some(TypeCode::Object),
            Kind::Engine(engine) => Some(TypeCode::Engine(*engine)),
            _ => None,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            TypeCode::Int => "I",
            TypeCode::Float => "F",
            TypeCode::String => "S",
            TypeCode::Object => "O",
            TypeCode::Engine(EngineType::Effect) => "EFF",
            TypeCode::Engine(EngineType::Event) => "EVT",
            TypeCode::Engine(EngineType::Location) => "LOC",
            TypeCode::Engine(EngineType::Talent) => "TAL",
        }
    }
}

fn engine_from_index(index: u8) -> Option<EngineType> {
    match index {
        0 => Some(EngineType::Effect),
        1 => Some(EngineType::Event),
        2 => Some(EngineType::Location),
        3 => Some(EngineType::Talent),
        _ => None,
    }
}

/// Operand-pair qualifier of binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairCode {
    IntInt,
    FloatFloat,
    ObjectObject,
    StringString,
    /// Aggregate comparison over `size` bytes (structs and vectors).
    StructStruct(u16),
    IntFloat,
    FloatInt,
    EngineEngine(EngineType),
    VectorVector,
    VectorFloat,
    FloatVector,
}

impl PairCode {
    pub fn byte(self) -> u8 {
        match self {
            PairCode::IntInt => 0x20,
            PairCode::FloatFloat => 0x21,
            PairCode::ObjectObject => 0x22,
            PairCode::StringString => 0x23,
            PairCode::StructStruct(_) => 0x24,
            PairCode::IntFloat => 0x25,
            PairCode::FloatInt => 0x26,
            PairCode::EngineEngine(engine) => 0x30 + engine.index(),
            PairCode::VectorVector => 0x3A,
            PairCode::VectorFloat => 0x3B,
            PairCode::FloatVector => 0x3C,
        }
    }

    /// Decode a qualifier byte. `StructStruct` comes back with size 0; the
    /// decoder reads the size operand separately.
    pub fn from_byte(byte: u8) -> Option<PairCode> {
        let code = match byte {
            0x20 => PairCode::IntInt,
            0x21 => PairCode::FloatFloat,
            0x22 => PairCode::ObjectObject,
            0x23 => PairCode::StringString,
            0x24 => PairCode::StructStruct(0),
            0x25 => PairCode::IntFloat,
            0x26 => PairCode::FloatInt,
            0x30..=0x33 => PairCode::EngineEngine(engine_from_index(byte - 0x30)?),
            0x3A => PairCode::VectorVector,
            0x3B => PairCode::VectorFloat,
            0x3C => PairCode::FloatVector,
            _ => return None,
        };
        Some(code)
    }

    pub fn suffix(self) -> &'static str {
        match self {
            PairCode::IntInt => "II",
            PairCode::FloatFloat => "FF",
            PairCode::ObjectObject => "OO",
            PairCode::StringString => "SS",
            PairCode::StructStruct(_) => "TT",
            PairCode::IntFloat => "IF",
            PairCode::FloatInt => "FI",
            PairCode::EngineEngine(EngineType::Effect) => "EFFEFF",
            PairCode::EngineEngine(EngineType::Event) => "EVTEVT",
            PairCode::EngineEngine(EngineType::Location) => "LOCLOC",
            PairCode::EngineEngine(EngineType::Talent) => "TALTAL",
            PairCode::VectorVector => "VV",
            PairCode::VectorFloat => "VF",
            PairCode::FloatVector => "FV",
        }
    }
}
