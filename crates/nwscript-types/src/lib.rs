//! Value kinds for compiled NWScript.
//!
//! Every expression in a script has exactly one compile-time [`Kind`]. The
//! kind decides how many stack slots the value occupies, which
//! kind-specialized instruction an operator lowers to, and whether a value can
//! be passed where another kind is expected.
//!
//! # Slot model
//!
//! The NCS machine works on a stack of 4-byte cells ([`SLOT_BYTES`]). Scalars
//! and engine handles take one cell, vectors take three floats, and structs
//! take the sum of their fields. `void` and `action` take no cells: an action
//! argument is captured as saved machine state instead of a stack value.
//!
//! # Widening
//!
//! The only implicit conversion is `int → float` ([`Kind::accepts`]). It
//! applies to arithmetic operand pairs, call arguments, initializers,
//! assignments and returns. Everything else is a kind mismatch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one stack cell in bytes.
pub const SLOT_BYTES: i32 = 4;

/// Object handle of the script's caller (`OBJECT_SELF`).
pub const OBJECT_SELF: u32 = 0;

/// Invalid object handle (`OBJECT_INVALID`).
pub const OBJECT_INVALID: u32 = 1;

/// Engine-defined opaque handle types, in routine-table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Effect,
    Event,
    Location,
    Talent,
}

impl EngineType {
    /// Index of the engine structure (`ENGINE_STRUCTURE_n`).
    pub fn index(self) -> u8 {
        match self {
            EngineType::Effect => 0,
            EngineType::Event => 1,
            EngineType::Location => 2,
            EngineType::Talent => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EngineType::Effect => "effect",
            EngineType::Event => "event",
            EngineType::Location => "location",
            EngineType::Talent => "talent",
        }
    }
}

/// Compile-time kind of a script value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Void,
    Int,
    Float,
    String,
    Object,
    Vector,
    Engine(EngineType),
    Action,
    /// A user-defined struct, by declared name.
    Struct(String),
}

impl Kind {
    pub const EFFECT: Kind = Kind::Engine(EngineType::Effect);
    pub const EVENT: Kind = Kind::Engine(EngineType::Event);
    pub const LOCATION: Kind = Kind::Engine(EngineType::Location);
    pub const TALENT: Kind = Kind::Engine(EngineType::Talent);

    /// Map a type keyword to its kind. Struct kinds are not keywords.
    pub fn from_keyword(word: &str) -> Option<Kind> {
        let kind = match word {
            "void" => Kind::Void,
            "int" => Kind::Int,
            "float" => Kind::Float,
            "string" => Kind::String,
            "object" => Kind::Object,
            "vector" => Kind::Vector,
            "effect" => Kind::EFFECT,
            "event" => Kind::EVENT,
            "location" => Kind::LOCATION,
            "talent" => Kind::TALENT,
            "action" => Kind::Action,
            _ => return None,
        };
        Some(kind)
    }

    /// Number of stack cells a value of this kind occupies.
    ///
    /// Returns `None` for structs, whose width depends on their declaration.
    pub fn slot_width(&self) -> Option<u32> {
        match self {
            Kind::Void | Kind::Action => Some(0),
            Kind::Int | Kind::Float | Kind::String | Kind::Object | Kind::Engine(_) => Some(1),
            Kind::Vector => Some(3),
            Kind::Struct(_) => None,
        }
    }

    /// Whether a value of `supplied` kind may be used where `self` is expected.
    pub fn accepts(&self, supplied: &Kind) -> bool {
        self == supplied || self.widens_from(supplied)
    }

    /// Whether `supplied` reaches `self` only through `int → float` widening.
    pub fn widens_from(&self, supplied: &Kind) -> bool {
        matches!((self, supplied), (Kind::Float, Kind::Int))
    }

    /// Kinds a variable or parameter may be declared with.
    pub fn is_storable(&self) -> bool {
        !matches!(self, Kind::Void | Kind::Action)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Void => f.write_str("void"),
            Kind::Int => f.write_str("int"),
            Kind::Float => f.write_str("float"),
            Kind::String => f.write_str("string"),
            Kind::Object => f.write_str("object"),
            Kind::Vector => f.write_str("vector"),
            Kind::Engine(engine) => f.write_str(engine.name()),
            Kind::Action => f.write_str("action"),
            Kind::Struct(name) => write!(f, "struct {name}"),
        }
    }
}

/// A compile-time constant: literals, engine constants and parameter defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstValue {
    Int(i32),
    Float(f32),
    String(String),
    Object(u32),
    Vector([f32; 3]),
}

impl ConstValue {
    pub fn kind(&self) -> Kind {
        match self {
            ConstValue::Int(_) => Kind::Int,
            ConstValue::Float(_) => Kind::Float,
            ConstValue::String(_) => Kind::String,
            ConstValue::Object(_) => Kind::Object,
            ConstValue::Vector(_) => Kind::Vector,
        }
    }

    /// Convert to `expected`, applying `int → float` widening when allowed.
    pub fn coerce(&self, expected: &Kind) -> Option<ConstValue> {
        match (self, expected) {
            (ConstValue::Int(value), Kind::Float) => Some(ConstValue::Float(*value as f32)),
            (value, expected) if value.kind() == *expected => Some(value.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(value) => write!(f, "{value}"),
            ConstValue::Float(value) => write!(f, "{value:?}"),
            ConstValue::String(value) => write!(f, "{value:?}"),
            ConstValue::Object(OBJECT_SELF) => f.write_str("OBJECT_SELF"),
            ConstValue::Object(OBJECT_INVALID) => f.write_str("OBJECT_INVALID"),
            ConstValue::Object(value) => write!(f, "object({value:#x})"),
            ConstValue::Vector([x, y, z]) => write!(f, "[{x:?}, {y:?}, {z:?}]"),
        }
    }
}
