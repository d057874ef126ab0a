//! Runtime values.

use nwscript_bytecode::{Constant, Position, TypeCode};
use nwscript_types::{EngineType, Kind, OBJECT_INVALID};
use std::fmt;

/// A value on the stack, or passed across the host boundary.
///
/// Stack cells only ever hold the scalar variants. `Vector` and `Action`
/// appear in host arguments and results: a vector is three `Float` cells on
/// the stack, an action is a [`ActionState`] captured by `STORE_STATE`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    String(String),
    Object(u32),
    /// Opaque handle to an engine structure, allocated by the host.
    Engine(EngineType, u32),
    Vector([f32; 3]),
    Action(ActionState),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
            Value::Object(_) => Kind::Object,
            Value::Engine(engine, _) => Kind::Engine(*engine),
            Value::Vector(_) => Kind::Vector,
            Value::Action(_) => Kind::Action,
        }
    }

    /// Cell pushed by `RSADD`.
    pub fn default_for(code: TypeCode) -> Value {
        match code {
            TypeCode::Int => Value::Int(0),
            TypeCode::Float => Value::Float(0.0),
            TypeCode::String => Value::String(String::new()),
            TypeCode::Object => Value::Object(OBJECT_INVALID),
            TypeCode::Engine(engine) => Value::Engine(engine, 0),
        }
    }

    /// Result pushed for a routine the host does not implement.
    pub fn default_for_kind(kind: &Kind) -> Option<Value> {
        match kind {
            Kind::Int => Some(Value::Int(0)),
            Kind::Float => Some(Value::Float(0.0)),
            Kind::String => Some(Value::String(String::new())),
            Kind::Object => Some(Value::Object(OBJECT_INVALID)),
            Kind::Engine(engine) => Some(Value::Engine(*engine, 0)),
            Kind::Vector => Some(Value::Vector([0.0; 3])),
            Kind::Void | Kind::Action | Kind::Struct(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Int(v) => Value::Int(*v),
            Constant::Float(v) => Value::Float(*v),
            Constant::String(v) => Value::String(v.clone()),
            Constant::Object(v) => Value::Object(*v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Object(v) => write!(f, "object({v:#x})"),
            Value::Engine(engine, handle) => write!(f, "{}#{handle}", engine.name()),
            Value::Vector([x, y, z]) => write!(f, "[{x:?}, {y:?}, {z:?}]"),
            Value::Action(state) => write!(f, "action@{}", state.resume),
        }
    }
}

/// Frame snapshot taken by `STORE_STATE`.
///
/// Running it restores `globals` under a fresh base pointer, pushes `locals`
/// and executes from `resume` until the deferred code returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionState {
    pub resume: Position,
    pub globals: Vec<Value>,
    pub locals: Vec<Value>,
}
