//! NCS Disassembler
//!
//! Print the instruction listing of an NCS file.
//!
//! Usage: `ncsdis <file.ncs>`

use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "ncsdis")]
#[command(about = "Disassemble an NCS program")]
struct Args {
    /// NCS file to disassemble
    input: PathBuf,
}

fn main() {
    nwscript_tools::init_logging();

    let args = Args::parse();

    match nwscript_tools::load_ncs(&args.input) {
        Ok(program) => print!("{}", nwscript_bytecode::listing(&program)),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
