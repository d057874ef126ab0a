//! Directory walks, batch lists, round trips and the run summary.

use nwscript_abi::RoutineTable;
use nwscript_ast::build::*;
use nwscript_bytecode::{Constant, Instruction, Program};
use nwscript_compiler::Compiler;
use nwscript_tools::{
    collect_units, first_difference, process_units, read_batch_list, roundtrip_file, Mode, Summary, Unit,
};
use std::fs;
use std::path::{Path, PathBuf};

fn hello() -> nwscript_ast::Program {
    program(vec![main(vec![expr_stmt(call("PrintString", vec![string("hello")]))])])
}

fn write_unit(path: &Path, unit: &nwscript_ast::Program) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_string(unit).unwrap()).unwrap();
    path.to_path_buf()
}

#[test]
fn test_directory_is_walked_recursively() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("scripts");
    write_unit(&root.join("k_a.json"), &hello());
    write_unit(&root.join("area/k_b.json"), &hello());
    fs::write(root.join("notes.txt"), "not a unit").unwrap();

    let units = collect_units(&[root.clone()]).unwrap();
    assert_eq!(
        units,
        vec![
            Unit {
                path: root.join("area/k_b.json"),
                relative_dir: PathBuf::from("area"),
            },
            Unit {
                path: root.join("k_a.json"),
                relative_dir: PathBuf::new(),
            },
        ]
    );

    let out_dir = dir.path().join("out");
    let compiler = Compiler::new(RoutineTable::builtin());
    let summary = process_units(
        &compiler,
        &units,
        &Mode::Compile {
            out_dir: out_dir.clone(),
        },
    );
    assert_eq!(summary, Summary { processed: 2, failed: 0 });
    assert!(out_dir.join("area/k_b.ncs").exists());
    assert!(out_dir.join("k_a.ncs").exists());
}

#[test]
fn test_batch_list_resolves_relative_entries() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("build.lst");
    fs::write(&list, "# module scripts\nk_a.json\n\n  sub/k_b.json  \n").unwrap();

    assert_eq!(
        read_batch_list(&list).unwrap(),
        vec![dir.path().join("k_a.json"), dir.path().join("sub/k_b.json")]
    );
    assert!(read_batch_list(&dir.path().join("missing.lst")).is_err());
}

#[test]
fn test_summary_counts_failures() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_unit(&dir.path().join("good.json"), &hello());
    let bad = write_unit(&dir.path().join("bad.json"), &program(vec![main(vec![brk()])]));
    let missing = dir.path().join("missing.json");

    let units = collect_units(&[good, bad, missing]).unwrap();
    let compiler = Compiler::new(RoutineTable::builtin());
    let summary = process_units(
        &compiler,
        &units,
        &Mode::Compile {
            out_dir: dir.path().join("out"),
        },
    );
    assert_eq!(summary, Summary { processed: 1, failed: 2 });
    assert_eq!(summary.total(), 3);
    assert!(!summary.is_success());
    assert_eq!(summary.to_string(), "1 processed, 2 failed");
}

#[test]
fn test_roundtrip_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_unit(&dir.path().join("k_hello.json"), &hello());
    let compiler = Compiler::new(RoutineTable::builtin());

    let size = roundtrip_file(&compiler, &input).unwrap();
    assert_eq!(size, compiler.compile_to_ncs(&hello()).unwrap().len());

    let units = collect_units(&[input]).unwrap();
    let summary = process_units(&compiler, &units, &Mode::RoundTrip);
    assert!(summary.is_success());
    assert!(!dir.path().join("k_hello.ncs").exists());
}

#[test]
fn test_first_difference() {
    let a = Program::from_instructions(vec![Instruction::Const(Constant::Int(1)), Instruction::Retn]);
    let b = Program::from_instructions(vec![Instruction::Const(Constant::Int(2)), Instruction::Retn]);
    let short = Program::from_instructions(vec![Instruction::Const(Constant::Int(1))]);

    assert_eq!(first_difference(&a, &a), None);
    assert_eq!(first_difference(&a, &b), Some(0));
    assert_eq!(first_difference(&a, &short), Some(1));
}
