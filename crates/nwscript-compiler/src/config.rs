//! Compiler configuration.
//!
//! Loaded from YAML:
//!
//! ```yaml
//! routineTable: path/to/nwscript.nss   # omit for the built-in table
//! entryPoints: [main, StartingConditional]
//! debug: true                          # log a listing of each program
//! ```

use nwscript_abi::{AbiError, RoutineTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading configuration or its routine table.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration YAML.
    #[error("failed to parse compiler config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The configured `nwscript.nss` is malformed.
    #[error("routine table {path}: {source}")]
    RoutineTable {
        path: PathBuf,
        #[source]
        source: AbiError,
    },

    #[error("entryPoints must not be empty")]
    NoEntryPoints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    /// `nwscript.nss` to load the routine table from. `None` selects the
    /// built-in table.
    #[serde(default)]
    pub routine_table: Option<PathBuf>,

    /// Entry function names, tried in order.
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,

    /// Log a disassembly of every compiled program at `debug` level.
    #[serde(default)]
    pub debug: bool,
}

fn default_entry_points() -> Vec<String> {
    vec!["main".to_string(), "StartingConditional".to_string()]
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            routine_table: None,
            entry_points: default_entry_points(),
            debug: false,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = serde_yaml::from_str(yaml)?;
        if config.entry_points.is_empty() {
            return Err(ConfigError::NoEntryPoints);
        }
        Ok(config)
    }

    /// Load the configured routine table.
    pub fn load_routine_table(&self) -> Result<RoutineTable, ConfigError> {
        let Some(path) = &self.routine_table else {
            return Ok(RoutineTable::builtin().clone());
        };
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        RoutineTable::from_nss(&source).map_err(|source| ConfigError::RoutineTable {
            path: path.clone(),
            source,
        })
    }
}
