//! Instruction shapes produced by lowering.

use nwscript_abi::RoutineTable;
use nwscript_ast::build::*;
use nwscript_ast::{BinaryOp, Program, UnaryOp};
use nwscript_bytecode::{
    BinaryOpcode, Constant, Instruction, JumpKind, PairCode, Position, TypeCode,
};
use nwscript_compiler::{Compiler, CompilerConfig};
use nwscript_types::Kind;

fn compile(unit: &Program) -> nwscript_bytecode::Program {
    nwscript_compiler::compile(unit, RoutineTable::builtin()).unwrap()
}

/// Instructions of `main` in a unit with no globals: after `JSR`, `RETN`.
fn main_body(unit: &Program) -> Vec<Instruction> {
    compile(unit).instructions()[2..].to_vec()
}

fn consti(value: i32) -> Instruction {
    Instruction::Const(Constant::Int(value))
}

#[test]
fn test_void_entry_prologue() {
    let program = compile(&program(vec![main(vec![])]));
    assert_eq!(
        program.instructions(),
        &[
            Instruction::Jump {
                kind: JumpKind::Jsr,
                target: Position(2),
            },
            Instruction::Retn,
            Instruction::Retn,
        ]
    );
}

#[test]
fn test_int_entry_reserves_result() {
    let unit = program(vec![function(
        "StartingConditional",
        Kind::Int,
        vec![],
        vec![ret(int(1))],
    )]);
    let program = compile(&unit);
    assert_eq!(program.instructions()[0], Instruction::RsAdd(TypeCode::Int));
    assert_eq!(
        program.instructions()[1],
        Instruction::Jump {
            kind: JumpKind::Jsr,
            target: Position(3),
        }
    );
    // value copied into the reserved cell below the (empty) frame
    assert_eq!(
        program.instructions()[4],
        Instruction::CpDownSp { offset: -8, size: 4 }
    );
}

#[test]
fn test_declarators_take_slots_in_order() {
    let unit = program(vec![main(vec![declare(
        Kind::Int,
        vec![
            ("a", Some(int(1))),
            ("b", Some(add(ident("a"), int(1)))),
            ("c", None),
        ],
    )])]);
    assert_eq!(
        main_body(&unit),
        vec![
            consti(1),
            Instruction::CpTopSp { offset: -4, size: 4 },
            consti(1),
            Instruction::Binary {
                op: BinaryOpcode::Add,
                operands: PairCode::IntInt,
            },
            Instruction::RsAdd(TypeCode::Int),
            Instruction::MovSp { offset: -12 },
            Instruction::Retn,
        ]
    );
}

#[test]
fn test_if_without_else_has_one_jump() {
    let unit = program(vec![main(vec![
        var(Kind::Int, "x", int(1)),
        if_(ident("x"), vec![expr_stmt(call("PrintInteger", vec![int(1)]))]),
        expr_stmt(call("PrintInteger", vec![int(2)])),
    ])]);
    let program = compile(&unit);
    let jumps: Vec<_> = program
        .instructions()
        .iter()
        .filter(|i| matches!(i, Instruction::Jump { kind: JumpKind::Jz, .. }))
        .collect();
    assert_eq!(jumps.len(), 1);
    let target = jumps[0].jump_target().unwrap();
    assert_eq!(program.get(target), Some(&consti(2)));
}

#[test]
fn test_if_else_branches() {
    let unit = program(vec![main(vec![if_else(
        int(1),
        vec![expr_stmt(call("PrintInteger", vec![int(10)]))],
        vec![expr_stmt(call("PrintInteger", vec![int(20)]))],
    )])]);
    let body = main_body(&unit);
    let Instruction::Jump { kind: JumpKind::Jz, target: else_start } = body[1] else {
        panic!("expected JZ, got {}", body[1]);
    };
    let Instruction::Jump { kind: JumpKind::Jmp, target: end } = body[4] else {
        panic!("expected JMP, got {}", body[4]);
    };
    let program = compile(&unit);
    assert_eq!(program.get(else_start), Some(&consti(20)));
    assert_eq!(program.get(end), Some(&Instruction::Retn));
}

#[test]
fn test_every_action_id_is_in_the_table() {
    let table = RoutineTable::builtin();
    let unit = program(vec![main(vec![
        expr_stmt(call("PrintString", vec![string("hello")])),
        var(Kind::Int, "r", call("Random", vec![int(6)])),
        expr_stmt(call("PrintFloat", vec![float(1.5)])),
        var(Kind::Object, "item", call("CreateItemOnObject", vec![string("g_w_blaster01")])),
        expr_stmt(call("DelayCommand", vec![float(2.0), call("PrintInteger", vec![ident("r")])])),
    ])]);
    let program = compile(&unit);
    let mut seen = 0;
    for instruction in program.instructions() {
        if let Instruction::Action { routine, argc } = instruction {
            let descriptor = table.by_id(*routine).expect("routine id in table");
            assert_eq!(*argc as usize, descriptor.params.len());
            seen += 1;
        }
    }
    assert_eq!(seen, 6);
}

#[test]
fn test_widening_of_arguments() {
    let table = RoutineTable::from_nss("void Test(float fValue, string sLabel);").unwrap();
    let unit = program(vec![main(vec![
        expr_stmt(call("Test", vec![int(1), string("x")])),
        var(Kind::Int, "n", int(2)),
        expr_stmt(call("Test", vec![ident("n"), string("y")])),
    ])]);
    let program = nwscript_compiler::compile(&unit, &table).unwrap();
    let body = &program.instructions()[2..];
    assert_eq!(body[0], Instruction::Const(Constant::String("x".into())));
    assert_eq!(body[1], Instruction::Const(Constant::Float(1.0)));
    assert_eq!(body[2], Instruction::Action { routine: 0, argc: 2 });
    assert_eq!(
        &body[5..8],
        &[
            Instruction::CpTopSp { offset: -8, size: 4 },
            Instruction::Const(Constant::Float(0.0)),
            Instruction::Binary {
                op: BinaryOpcode::Add,
                operands: PairCode::IntFloat,
            },
        ]
    );
}

#[test]
fn test_defaults_pushed_before_arguments() {
    let body = main_body(&program(vec![main(vec![expr_stmt(call(
        "PrintFloat",
        vec![float(2.0)],
    ))])]));
    assert_eq!(
        &body[..4],
        &[
            consti(9),
            consti(18),
            Instruction::Const(Constant::Float(2.0)),
            Instruction::Action { routine: 2, argc: 3 },
        ]
    );
}

#[test]
fn test_object_defaults_use_engine_constants() {
    let body = main_body(&program(vec![main(vec![expr_stmt(call(
        "CreateItemOnObject",
        vec![string("g_i_medeqpmnt01")],
    ))])]));
    assert_eq!(
        &body[..4],
        &[
            consti(1),
            Instruction::Const(Constant::Object(nwscript_types::OBJECT_SELF)),
            Instruction::Const(Constant::String("g_i_medeqpmnt01".into())),
            Instruction::Action { routine: 31, argc: 3 },
        ]
    );
}

#[test]
fn test_deferred_action_layout() {
    let unit = program(vec![main(vec![
        var(Kind::Int, "n", int(4)),
        expr_stmt(call(
            "DelayCommand",
            vec![float(1.0), call("PrintInteger", vec![ident("n")])],
        )),
    ])]);
    let program = compile(&unit);
    let instructions = program.instructions();
    let store = instructions
        .iter()
        .position(|i| matches!(i, Instruction::StoreState { .. }))
        .unwrap();
    assert_eq!(
        instructions[store],
        Instruction::StoreState {
            bp_size: 0,
            sp_size: 4,
        }
    );
    let Instruction::Jump { kind: JumpKind::Jmp, target } = instructions[store + 1] else {
        panic!("STORE_STATE must be followed by a jump over the deferred code");
    };
    assert_eq!(instructions[target.index() - 1], Instruction::Retn);
    assert_eq!(
        instructions[target.index()],
        Instruction::Const(Constant::Float(1.0))
    );
}

#[test]
fn test_forward_call_is_patched() {
    let unit = program(vec![
        main(vec![expr_stmt(call("helper", vec![]))]),
        function("helper", Kind::Void, vec![], vec![]),
    ]);
    let program = compile(&unit);
    let calls: Vec<Position> = program
        .instructions()
        .iter()
        .filter_map(|i| match i {
            Instruction::Jump {
                kind: JumpKind::Jsr,
                target,
            } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 2);
    // entry JSR to main, main's JSR to helper (the last RETN)
    assert_eq!(calls[0], Position(2));
    assert_eq!(calls[1].index(), program.len() - 1);
}

#[test]
fn test_globals_addressed_through_bp() {
    let unit = program(vec![
        global(Kind::Int, vec![("g", Some(int(3)))]),
        main(vec![expr_stmt(unary(UnaryOp::PreIncrement, ident("g")))]),
    ]);
    let instructions = compile(&unit).instructions().to_vec();
    assert_eq!(
        &instructions[..9],
        &[
            Instruction::RsAdd(TypeCode::Int),
            Instruction::SaveBp,
            consti(3),
            Instruction::CpDownBp { offset: -8, size: 4 },
            Instruction::MovSp { offset: -4 },
            Instruction::Jump {
                kind: JumpKind::Jsr,
                target: Position(9),
            },
            Instruction::RestoreBp,
            Instruction::MovSp { offset: -4 },
            Instruction::Retn,
        ]
    );
    assert_eq!(instructions[9], Instruction::IncIBp { offset: -8 });
    assert_eq!(instructions[10], Instruction::CpTopBp { offset: -8, size: 4 });
}

#[test]
fn test_later_global_not_visible_to_earlier_initializer() {
    let unit = program(vec![
        global(Kind::Int, vec![("a", Some(ident("b"))), ("b", Some(int(1)))]),
        main(vec![]),
    ]);
    assert_eq!(
        nwscript_compiler::compile(&unit, RoutineTable::builtin()).unwrap_err().kind,
        nwscript_compiler::CompileErrorKind::UndeclaredIdentifier("b".into())
    );
}

#[test]
fn test_field_read_destructs_copy() {
    let unit = program(vec![main(vec![
        var(Kind::Vector, "v", vector(1.0, 2.0, 3.0)),
        var(Kind::Float, "y", field(ident("v"), "y")),
    ])]);
    let body = main_body(&unit);
    assert_eq!(body[3], Instruction::CpTopSp { offset: -12, size: 12 });
    assert_eq!(
        body[4],
        Instruction::Destruct {
            size: 12,
            keep_offset: 4,
            keep_size: 4,
        }
    );
}

#[test]
fn test_vector_equality_compares_twelve_bytes() {
    let unit = program(vec![main(vec![
        var(Kind::Vector, "a", vector(1.0, 2.0, 3.0)),
        var(Kind::Int, "same", eq(ident("a"), ident("a"))),
    ])]);
    assert!(main_body(&unit).contains(&Instruction::Binary {
        op: BinaryOpcode::Equal,
        operands: PairCode::StructStruct(12),
    }));
}

#[test]
fn test_short_circuit_shape() {
    let unit = program(vec![main(vec![var(
        Kind::Int,
        "b",
        binary(BinaryOp::Or, int(1), int(0)),
    )])]);
    let body = main_body(&unit);
    assert_eq!(body[1], Instruction::CpTopSp { offset: -4, size: 4 });
    assert!(matches!(body[2], Instruction::Jump { kind: JumpKind::Jnz, .. }));
    assert_eq!(
        body[4],
        Instruction::Binary {
            op: BinaryOpcode::LogOr,
            operands: PairCode::IntInt,
        }
    );
    assert_eq!(body[2].jump_target().map(|p| p.index()), Some(2 + 5));
}

#[test]
fn test_custom_entry_point() {
    let config = CompilerConfig {
        entry_points: vec!["OnSpawn".to_string()],
        ..CompilerConfig::default()
    };
    let unit = program(vec![function("OnSpawn", Kind::Void, vec![], vec![])]);
    let compiler = Compiler::with_config(RoutineTable::builtin(), config);
    let bytes = compiler.compile_to_ncs(&unit).unwrap();
    assert_eq!(&bytes[..8], b"NCS V1.0");
}
