//! NWScript Compiler
//!
//! Compile JSON syntax trees into NCS programs.
//!
//! Usage: `nsscomp <unit.json | dir>... [--batch LIST] [--out-dir DIR] [--roundtrip]
//! [--config FILE] [--nwscript FILE]`
//!
//! Directories are walked recursively; a batch list names one input per
//! line. With `--roundtrip` nothing is written: each unit is compiled,
//! encoded and decoded, and the decoded program compared with the compiled
//! one.

use clap::Parser;
use nwscript_compiler::{Compiler, CompilerConfig};
use nwscript_tools::{collect_units, process_units, read_batch_list, Mode};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "nsscomp")]
#[command(about = "Compile NWScript syntax trees (JSON) into NCS bytecode")]
struct Args {
    /// Syntax tree files or directories to compile
    #[arg(required_unless_present = "batch")]
    inputs: Vec<PathBuf>,

    /// File listing inputs, one per line
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Output directory for .ncs files
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// Check compile, encode and decode agree instead of writing files
    #[arg(long)]
    roundtrip: bool,

    /// Compiler configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// nwscript.nss to take the routine table from
    #[arg(long)]
    nwscript: Option<PathBuf>,

    /// Entry point names, tried in order
    #[arg(long = "entry")]
    entry_points: Vec<String>,

    /// Log a listing of each compiled program
    #[arg(long)]
    debug: bool,
}

fn main() {
    nwscript_tools::init_logging();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match CompilerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };
    if args.nwscript.is_some() {
        config.routine_table = args.nwscript.clone();
    }
    if !args.entry_points.is_empty() {
        config.entry_points = args.entry_points.clone();
    }
    config.debug |= args.debug;

    let table = match config.load_routine_table() {
        Ok(table) => table,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    info!(routines = table.len(), "routine table ready");

    let mut inputs = args.inputs.clone();
    if let Some(list) = &args.batch {
        match read_batch_list(list) {
            Ok(listed) => inputs.extend(listed),
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        }
    }
    let units = match collect_units(&inputs) {
        Ok(units) => units,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    if units.is_empty() {
        error!("no syntax trees found");
        process::exit(1);
    }

    let mode = if args.roundtrip {
        Mode::RoundTrip
    } else {
        Mode::Compile {
            out_dir: args.out_dir.clone(),
        }
    };
    let compiler = Compiler::with_config(&table, config);
    let summary = process_units(&compiler, &units, &mode);
    info!(processed = summary.processed, failed = summary.failed, "{}", summary);

    if !summary.is_success() {
        error!("{} of {} units failed", summary.failed, summary.total());
        process::exit(1);
    }
}
