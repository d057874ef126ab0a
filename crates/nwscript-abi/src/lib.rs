//! Engine-call ABI.
//!
//! Compiled scripts reach host functionality through numbered engine
//! routines. A call pushes its arguments right to left (the first parameter
//! ends up nearest the top of the stack) and then executes
//! `ACTION(routine id, argument count)`. The host pops the arguments and
//! pushes exactly one result, or nothing for `void` routines.
//!
//! The [`RoutineTable`] maps routine names to descriptors (id, parameters,
//! return kind) and also carries the engine constants (`TRUE`,
//! `OBJECT_TYPE_CREATURE`, ...) that scripts may reference by name.
//!
//! Tables come from an `nwscript.nss` declaration file ([`RoutineTable::from_nss`])
//! or from the embedded built-in table ([`RoutineTable::builtin`]).
//!
//! # Example
//!
//! ```
//! use nwscript_abi::RoutineTable;
//! use nwscript_types::Kind;
//!
//! let table = RoutineTable::builtin();
//! let print = table.lookup("PrintInteger").unwrap();
//! assert_eq!(print.id, 4);
//! assert!(table.validate_args(print, &[Kind::Int]).is_ok());
//! ```

mod builtin;
mod error;
mod nss;

pub use error::AbiError;

use indexmap::IndexMap;
use nwscript_types::{ConstValue, Kind};
use std::fmt;

/// Numeric index into the host routine table.
pub type RoutineId = u16;

/// A routine parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: Kind,
    /// Value pushed when the caller omits this (trailing) argument.
    pub default: Option<ConstValue>,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn with_default(mut self, default: ConstValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Descriptor for one engine routine.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDescriptor {
    pub id: RoutineId,
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Kind,
}

impl RoutineDescriptor {
    /// Fewest arguments a call may supply.
    pub fn min_args(&self) -> usize {
        min_args(&self.params)
    }
}

impl fmt::Display for RoutineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.returns, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", param.kind, param.name)?;
            if let Some(default) = &param.default {
                write!(f, " = {default}")?;
            }
        }
        f.write_str(")")
    }
}

/// Number of leading parameters without a default.
pub fn min_args(params: &[Param]) -> usize {
    let defaulted = params
        .iter()
        .rev()
        .take_while(|param| param.default.is_some())
        .count();
    params.len() - defaulted
}

/// Check `supplied` argument kinds against `params` positionally.
///
/// Each argument must equal its parameter's kind or widen to it
/// (`int → float`). The first mismatching position is reported. Arity is
/// checked after kinds so a mismatch in the supplied prefix wins.
pub fn check_arguments(routine: &str, params: &[Param], supplied: &[Kind]) -> Result<(), AbiError> {
    for (position, (param, found)) in params.iter().zip(supplied).enumerate() {
        if !param.kind.accepts(found) {
            return Err(AbiError::ArgumentKindMismatch {
                routine: routine.to_string(),
                position,
                expected: param.kind.clone(),
                found: found.clone(),
            });
        }
    }

    let min = min_args(params);
    if supplied.len() < min || supplied.len() > params.len() {
        return Err(AbiError::ArityMismatch {
            routine: routine.to_string(),
            min,
            max: params.len(),
            found: supplied.len(),
        });
    }
    Ok(())
}

/// Immutable engine routine table plus engine constants.
///
/// Shared by reference across parallel compilations.
#[derive(Debug, Clone, Default)]
pub struct RoutineTable {
    routines: Vec<RoutineDescriptor>,
    by_name: IndexMap<String, usize>,
    constants: IndexMap<String, ConstValue>,
}

impl RoutineTable {
    /// Build a table from descriptors whose ids equal their index.
    ///
    /// # Panics
    ///
    /// Panics if a descriptor's id does not match its position or a name
    /// is declared twice.
    pub fn new(routines: Vec<RoutineDescriptor>, constants: IndexMap<String, ConstValue>) -> Self {
        let mut by_name = IndexMap::with_capacity(routines.len());
        for (index, routine) in routines.iter().enumerate() {
            assert_eq!(
                routine.id as usize, index,
                "routine `{}` has id {} at index {}",
                routine.name, routine.id, index
            );
            let previous = by_name.insert(routine.name.clone(), index);
            assert!(previous.is_none(), "routine `{}` declared twice", routine.name);
        }
        Self {
            routines,
            by_name,
            constants,
        }
    }

    /// Load a table from `nwscript.nss` declarations.
    ///
    /// Prototypes are numbered in order of appearance. `OBJECT_SELF` and
    /// `OBJECT_INVALID` are always defined.
    pub fn from_nss(source: &str) -> Result<Self, AbiError> {
        let parsed = nss::parse(source)?;
        tracing::debug!(
            routines = parsed.routines.len(),
            constants = parsed.constants.len(),
            "loaded routine table"
        );
        Ok(Self {
            routines: parsed.routines,
            by_name: parsed.by_name,
            constants: parsed.constants,
        })
    }

    /// The embedded KotOR table (routines 0..=123 and common constants).
    pub fn builtin() -> &'static RoutineTable {
        builtin::table()
    }

    /// Look up a routine by name.
    pub fn lookup(&self, name: &str) -> Result<&RoutineDescriptor, AbiError> {
        self.get(name)
            .ok_or_else(|| AbiError::UnknownEngineFunction(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&RoutineDescriptor> {
        self.by_name.get(name).map(|&index| &self.routines[index])
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Look up a routine by numeric id (VM side).
    pub fn by_id(&self, id: RoutineId) -> Option<&RoutineDescriptor> {
        self.routines.get(id as usize)
    }

    pub fn constant(&self, name: &str) -> Option<&ConstValue> {
        self.constants.get(name)
    }

    pub fn constants(&self) -> impl Iterator<Item = (&str, &ConstValue)> {
        self.constants.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn routines(&self) -> &[RoutineDescriptor] {
        &self.routines
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Validate a call's argument kinds against `routine`.
    pub fn validate_args(&self, routine: &RoutineDescriptor, supplied: &[Kind]) -> Result<(), AbiError> {
        check_arguments(&routine.name, &routine.params, supplied)
    }
}
