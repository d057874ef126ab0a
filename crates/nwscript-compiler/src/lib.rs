//! NWScript Compiler
//!
//! Lowers a parsed NWScript unit to an NCS [`Program`].
//!
//! The compiler consumes a syntax tree ([`nwscript_ast::Program`]) together
//! with the engine [`RoutineTable`] and produces a finalized instruction
//! stream, ready for [`Program::to_ncs`]. Compilation stops at the first
//! error.
//!
//! ```
//! use nwscript_abi::RoutineTable;
//! use nwscript_ast::build::*;
//!
//! let unit = program(vec![main(vec![expr_stmt(call("PrintString", vec![string("hi")]))])]);
//! let compiled = nwscript_compiler::compile(&unit, RoutineTable::builtin()).unwrap();
//! assert!(!compiled.to_ncs().unwrap().is_empty());
//! ```

pub mod config;
pub mod error;
mod lower;
pub mod scope;
pub mod structs;

pub use config::{CompilerConfig, ConfigError};
pub use error::{CompileError, CompileErrorKind, MismatchSite};
pub use nwscript_bytecode::Program;

use nwscript_abi::RoutineTable;
use nwscript_ast::Span;
use tracing::debug;

/// Compiler bound to a routine table and configuration.
#[derive(Debug, Clone)]
pub struct Compiler<'t> {
    table: &'t RoutineTable,
    config: CompilerConfig,
}

impl<'t> Compiler<'t> {
    pub fn new(table: &'t RoutineTable) -> Self {
        Self::with_config(table, CompilerConfig::default())
    }

    pub fn with_config(table: &'t RoutineTable, config: CompilerConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile one unit.
    pub fn compile(&self, unit: &nwscript_ast::Program) -> Result<Program, CompileError> {
        let program = lower::lower_program(self.table, &self.config, unit)?;
        debug!(instructions = program.len(), "compiled unit");
        if self.config.debug {
            debug!("listing:\n{}", nwscript_bytecode::listing(&program));
        }
        Ok(program)
    }

    /// Compile one unit and encode it as NCS bytes.
    pub fn compile_to_ncs(&self, unit: &nwscript_ast::Program) -> Result<Vec<u8>, CompileError> {
        let program = self.compile(unit)?;
        program
            .to_ncs()
            .map_err(|err| CompileErrorKind::Encoding(err.to_string()).at(Span::default()))
    }
}

/// Compile `unit` against `table` with the default configuration.
pub fn compile(unit: &nwscript_ast::Program, table: &RoutineTable) -> Result<Program, CompileError> {
    Compiler::new(table).compile(unit)
}
