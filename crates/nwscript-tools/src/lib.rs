//! NWScript Tools
//!
//! CLI tools for compiling syntax trees to NCS and inspecting NCS files.
//!
//! Front ends hand the compiler a syntax tree serialized as JSON
//! (`nwscript_ast::Program`); `nsscomp` writes one `.ncs` file per tree into
//! an output directory and `ncsdis` prints a listing.
//!
//! Inputs may be single files, directories (walked recursively for `.json`
//! trees) or batch lists naming either. Units are processed in parallel and
//! tallied in a [`Summary`].

use nwscript_bytecode::{DecodeError, EncodeError, Program};
use nwscript_compiler::{CompileError, Compiler};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

/// Extension of syntax tree files picked up from directories.
pub const UNIT_EXTENSION: &str = "json";

/// Initialize logging with a default filter.
///
/// Use `RUST_LOG` environment variable to override the default filter.
/// Default is `info`, with `debug` for the compiler's own crates.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nwscript_tools=debug,nwscript_compiler=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid syntax tree: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {source}")]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },

    #[error("{path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },

    #[error("{path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{path}: decoded program differs from compiled program at instruction {index}")]
    RoundTrip { path: PathBuf, index: usize },
}

/// One syntax tree to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub path: PathBuf,
    /// Where its output goes, relative to the output root. Mirrors the
    /// layout below a walked directory.
    pub relative_dir: PathBuf,
}

/// Expand inputs into units: directories are walked recursively for
/// `.json` trees in file name order, files are taken as given.
pub fn collect_units(inputs: &[PathBuf]) -> Result<Vec<Unit>, ToolError> {
    let mut units = Vec::new();
    for input in inputs {
        if input.is_dir() {
            units.extend(walk_directory(input)?);
        } else {
            units.push(Unit {
                path: input.clone(),
                relative_dir: PathBuf::new(),
            });
        }
    }
    Ok(units)
}

fn walk_directory(root: &Path) -> Result<Vec<Unit>, ToolError> {
    let mut units = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| ToolError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == UNIT_EXTENSION) {
            let relative_dir = path
                .parent()
                .and_then(|parent| parent.strip_prefix(root).ok())
                .map(Path::to_path_buf)
                .unwrap_or_default();
            units.push(Unit {
                path: path.to_path_buf(),
                relative_dir,
            });
        }
    }
    debug!(root = %root.display(), units = units.len(), "walked directory");
    Ok(units)
}

/// Read a batch list: one input per line, blank lines and `#` comments
/// skipped. Relative entries resolve against the list's directory.
pub fn read_batch_list(path: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let text = fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| base.join(line))
        .collect())
}

fn read(path: &Path) -> Result<Vec<u8>, ToolError> {
    fs::read(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a JSON syntax tree.
pub fn load_unit(path: &Path) -> Result<nwscript_ast::Program, ToolError> {
    let bytes = read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| ToolError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// `out_dir/<input stem>.ncs`.
pub fn output_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "script".to_string());
    out_dir.join(format!("{stem}.ncs"))
}

/// Compile one JSON syntax tree and write its NCS file, returning the
/// written path.
pub fn compile_file(compiler: &Compiler<'_>, input: &Path, out_dir: &Path) -> Result<PathBuf, ToolError> {
    let unit = load_unit(input)?;
    let program = compiler.compile(&unit).map_err(|source| ToolError::Compile {
        path: input.to_path_buf(),
        source,
    })?;
    let bytes = program.to_ncs().map_err(|source| ToolError::Encode {
        path: input.to_path_buf(),
        source,
    })?;

    let output = output_path(input, out_dir);
    fs::create_dir_all(out_dir).map_err(|source| ToolError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;
    fs::write(&output, &bytes).map_err(|source| ToolError::Io {
        path: output.clone(),
        source,
    })?;
    debug!(input = %input.display(), bytes = bytes.len(), "wrote {}", output.display());
    Ok(output)
}

/// Compile `input`, encode it, decode the bytes and check the decoded
/// program matches. Returns the encoded size.
pub fn roundtrip_file(compiler: &Compiler<'_>, input: &Path) -> Result<usize, ToolError> {
    let unit = load_unit(input)?;
    let program = compiler.compile(&unit).map_err(|source| ToolError::Compile {
        path: input.to_path_buf(),
        source,
    })?;
    let bytes = program.to_ncs().map_err(|source| ToolError::Encode {
        path: input.to_path_buf(),
        source,
    })?;
    let decoded = Program::from_ncs(&bytes).map_err(|source| ToolError::Decode {
        path: input.to_path_buf(),
        source,
    })?;
    if let Some(index) = first_difference(&program, &decoded) {
        return Err(ToolError::RoundTrip {
            path: input.to_path_buf(),
            index,
        });
    }
    Ok(bytes.len())
}

/// Index of the first instruction where `a` and `b` disagree.
pub fn first_difference(a: &Program, b: &Program) -> Option<usize> {
    let (a, b) = (a.instructions(), b.instructions());
    a.iter()
        .zip(b)
        .position(|(left, right)| left != right)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

/// What to do with each unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Write `<stem>.ncs` below `out_dir`.
    Compile { out_dir: PathBuf },
    /// Compile, encode and decode; write nothing.
    RoundTrip,
}

/// Units that went through and units that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.processed + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} processed, {} failed", self.processed, self.failed)
    }
}

/// Process every unit in parallel, logging each outcome.
pub fn process_units(compiler: &Compiler<'_>, units: &[Unit], mode: &Mode) -> Summary {
    let failed = units
        .par_iter()
        .filter(|unit| {
            let result = match mode {
                Mode::Compile { out_dir } => {
                    compile_file(compiler, &unit.path, &out_dir.join(&unit.relative_dir)).map(|output| {
                        info!("Compiled {} -> {}", unit.path.display(), output.display());
                    })
                }
                Mode::RoundTrip => roundtrip_file(compiler, &unit.path).map(|bytes| {
                    info!(bytes, "Round trip ok: {}", unit.path.display());
                }),
            };
            match result {
                Ok(()) => false,
                Err(e) => {
                    error!("{}", e);
                    true
                }
            }
        })
        .count();
    Summary {
        processed: units.len() - failed,
        failed,
    }
}

/// Decode an NCS file.
pub fn load_ncs(path: &Path) -> Result<Program, ToolError> {
    let bytes = read(path)?;
    Program::from_ncs(&bytes).map_err(|source| ToolError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
