//! Struct layouts and aggregate widths.

use crate::error::CompileErrorKind;
use indexmap::IndexMap;
use nwscript_types::Kind;

/// A laid-out field: `offset` cells from the start of its aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub kind: Kind,
    pub offset: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StructLayout {
    pub fields: Vec<FieldLayout>,
    pub width: u32,
}

const VECTOR_FIELDS: [&str; 3] = ["x", "y", "z"];

/// Declared structs of one unit, in declaration order.
#[derive(Debug, Default)]
pub struct StructTable {
    structs: IndexMap<String, StructLayout>,
}

impl StructTable {
    /// Lay out `name`. Field kinds must already be known, so structs can
    /// only contain structs declared before them.
    pub fn declare(&mut self, name: &str, fields: &[(String, Kind)]) -> Result<(), CompileErrorKind> {
        if self.structs.contains_key(name) {
            return Err(CompileErrorKind::DuplicateDeclaration(name.to_string()));
        }
        let mut layout = StructLayout::default();
        for (field, kind) in fields {
            if !kind.is_storable() {
                return Err(CompileErrorKind::InvalidVariableKind {
                    name: field.clone(),
                    kind: kind.clone(),
                });
            }
            if layout.fields.iter().any(|f| f.name == *field) {
                return Err(CompileErrorKind::DuplicateDeclaration(field.clone()));
            }
            let width = self.width(kind)?;
            layout.fields.push(FieldLayout {
                name: field.clone(),
                kind: kind.clone(),
                offset: layout.width,
                width,
            });
            layout.width += width;
        }
        self.structs.insert(name.to_string(), layout);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    /// Cells occupied by a value of `kind`.
    pub fn width(&self, kind: &Kind) -> Result<u32, CompileErrorKind> {
        match kind {
            Kind::Struct(name) => self
                .structs
                .get(name)
                .map(|layout| layout.width)
                .ok_or_else(|| CompileErrorKind::UnknownStruct(name.clone())),
            other => Ok(other.slot_width().unwrap_or(0)),
        }
    }

    /// Kind and cell offset of `field` within an aggregate of `kind`.
    pub fn field(&self, kind: &Kind, field: &str) -> Result<(Kind, u32, u32), CompileErrorKind> {
        let unknown = || CompileErrorKind::UnknownField {
            kind: kind.clone(),
            field: field.to_string(),
        };
        match kind {
            Kind::Vector => VECTOR_FIELDS
                .iter()
                .position(|name| *name == field)
                .map(|offset| (Kind::Float, offset as u32, 1))
                .ok_or_else(unknown),
            Kind::Struct(name) => {
                let layout = self
                    .structs
                    .get(name)
                    .ok_or_else(|| CompileErrorKind::UnknownStruct(name.clone()))?;
                layout
                    .fields
                    .iter()
                    .find(|f| f.name == field)
                    .map(|f| (f.kind.clone(), f.offset, f.width))
                    .ok_or_else(unknown)
            }
            _ => Err(unknown()),
        }
    }

    /// Scalar kinds making up `kind`, in stack order.
    pub fn flatten(&self, kind: &Kind) -> Result<Vec<Kind>, CompileErrorKind> {
        let mut out = Vec::new();
        self.flatten_into(kind, &mut out)?;
        Ok(out)
    }

    fn flatten_into(&self, kind: &Kind, out: &mut Vec<Kind>) -> Result<(), CompileErrorKind> {
        match kind {
            Kind::Vector => out.extend([Kind::Float, Kind::Float, Kind::Float]),
            Kind::Struct(name) => {
                let layout = self
                    .structs
                    .get(name)
                    .ok_or_else(|| CompileErrorKind::UnknownStruct(name.clone()))?;
                for field in &layout.fields {
                    self.flatten_into(&field.kind, out)?;
                }
            }
            Kind::Void | Kind::Action => {}
            scalar => out.push(scalar.clone()),
        }
        Ok(())
    }
}
