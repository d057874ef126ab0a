//! Rejected units and the errors they report.

use nwscript_abi::RoutineTable;
use nwscript_ast::build::*;
use nwscript_ast::{CaseLabel, Program, Span};
use nwscript_compiler::{CompileErrorKind, Compiler, CompilerConfig, MismatchSite};
use nwscript_types::Kind;

fn error(unit: &Program) -> CompileErrorKind {
    nwscript_compiler::compile(unit, RoutineTable::builtin())
        .unwrap_err()
        .kind
}

#[test]
fn test_duplicate_in_same_block() {
    let unit = program(vec![main(vec![
        var(Kind::Int, "x", int(1)),
        var(Kind::Int, "x", int(2)),
    ])]);
    assert_eq!(error(&unit), CompileErrorKind::DuplicateDeclaration("x".into()));

    let nested = program(vec![main(vec![
        var(Kind::Int, "x", int(1)),
        block(vec![var(Kind::Int, "x", int(2))]),
    ])]);
    assert!(nwscript_compiler::compile(&nested, RoutineTable::builtin()).is_ok());
}

#[test]
fn test_declarator_cannot_see_later_names() {
    let unit = program(vec![main(vec![declare(
        Kind::Int,
        vec![("a", Some(ident("b"))), ("b", Some(int(1)))],
    )])]);
    assert_eq!(error(&unit), CompileErrorKind::UndeclaredIdentifier("b".into()));
}

#[test]
fn test_break_and_continue_need_a_loop() {
    let outside = program(vec![main(vec![brk()])]);
    assert_eq!(error(&outside), CompileErrorKind::BreakContinueOutsideLoop("break"));

    let in_if = program(vec![main(vec![if_(int(1), vec![cont()])])]);
    assert_eq!(error(&in_if), CompileErrorKind::BreakContinueOutsideLoop("continue"));

    // switch accepts break but not continue
    let in_switch = program(vec![main(vec![switch(
        int(1),
        vec![(CaseLabel::Int(1), vec![cont()])],
    )])]);
    assert_eq!(error(&in_switch), CompileErrorKind::BreakContinueOutsideLoop("continue"));

    let break_switch = program(vec![main(vec![switch(
        int(1),
        vec![(CaseLabel::Int(1), vec![brk()])],
    )])]);
    assert!(nwscript_compiler::compile(&break_switch, RoutineTable::builtin()).is_ok());
}

#[test]
fn test_argument_mismatch_reports_position() {
    let table = RoutineTable::from_nss("void Test(int nValue, string sLabel);").unwrap();
    let unit = program(vec![main(vec![at(
        4,
        expr_stmt(call("Test", vec![at(4, string("oops")), int(1)])),
    )])]);
    let err = nwscript_compiler::compile(&unit, &table).unwrap_err();
    assert_eq!(
        err.kind,
        CompileErrorKind::KindMismatch {
            site: MismatchSite::Argument {
                function: "Test".into(),
                position: 0,
            },
            expected: "int".into(),
            found: Kind::String,
        }
    );
    assert_eq!(err.span.line, 4);
}

#[test]
fn test_widening_is_one_directional() {
    let table = RoutineTable::from_nss("void Test(int nValue);").unwrap();
    let unit = program(vec![main(vec![expr_stmt(call("Test", vec![float(1.0)]))])]);
    assert!(matches!(
        nwscript_compiler::compile(&unit, &table).unwrap_err().kind,
        CompileErrorKind::KindMismatch { found: Kind::Float, .. }
    ));
}

#[test]
fn test_arity() {
    let unit = program(vec![main(vec![expr_stmt(call("PrintInteger", vec![]))])]);
    assert_eq!(
        error(&unit),
        CompileErrorKind::ArityMismatch {
            function: "PrintInteger".into(),
            min: 1,
            max: 1,
            found: 0,
        }
    );
}

#[test]
fn test_unknown_function() {
    let unit = program(vec![main(vec![expr_stmt(call("NoSuchRoutine", vec![]))])]);
    assert_eq!(
        error(&unit),
        CompileErrorKind::UnknownEngineFunction("NoSuchRoutine".into())
    );
}

#[test]
fn test_prototype_without_body() {
    let unit = program(vec![
        prototype("later", Kind::Void, vec![]),
        main(vec![at(9, expr_stmt(at(9, call("later", vec![]))))]),
    ]);
    let err = nwscript_compiler::compile(&unit, RoutineTable::builtin()).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnresolvedForwardCall("later".into()));
    assert_eq!(err.span.line, 9);
}

#[test]
fn test_signature_mismatch() {
    let unit = program(vec![
        prototype("helper", Kind::Int, vec![param("n", Kind::Int)]),
        function("helper", Kind::Int, vec![param("n", Kind::Float)], vec![ret(int(0))]),
        main(vec![]),
    ]);
    assert_eq!(error(&unit), CompileErrorKind::SignatureMismatch("helper".into()));
}

#[test]
fn test_user_function_cannot_shadow_engine_routine() {
    let unit = program(vec![
        function("PrintString", Kind::Void, vec![param("s", Kind::String)], vec![]),
        main(vec![]),
    ]);
    assert_eq!(error(&unit), CompileErrorKind::DuplicateDeclaration("PrintString".into()));
}

#[test]
fn test_entry_points() {
    let none = program(vec![function("helper", Kind::Void, vec![], vec![])]);
    assert_eq!(
        error(&none),
        CompileErrorKind::MissingEntryPoint("main, StartingConditional".into())
    );

    let with_params = program(vec![function(
        "main",
        Kind::Void,
        vec![param("n", Kind::Int)],
        vec![],
    )]);
    assert_eq!(error(&with_params), CompileErrorKind::InvalidEntryPoint("main".into()));

    let config = CompilerConfig {
        entry_points: vec!["OnSpawn".into()],
        ..CompilerConfig::default()
    };
    let err = Compiler::with_config(RoutineTable::builtin(), config)
        .compile(&program(vec![main(vec![])]))
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::MissingEntryPoint("OnSpawn".into()));
}

#[test]
fn test_return_kinds() {
    let value_from_void = program(vec![main(vec![ret(int(1))])]);
    assert!(matches!(
        error(&value_from_void),
        CompileErrorKind::KindMismatch {
            site: MismatchSite::Return(_),
            found: Kind::Int,
            ..
        }
    ));

    let bare_from_int = program(vec![function(
        "StartingConditional",
        Kind::Int,
        vec![],
        vec![ret_void()],
    )]);
    assert!(matches!(
        error(&bare_from_int),
        CompileErrorKind::KindMismatch {
            site: MismatchSite::Return(_),
            found: Kind::Void,
            ..
        }
    ));
}

#[test]
fn test_condition_must_be_int() {
    let unit = program(vec![main(vec![while_(string("yes"), vec![])])]);
    assert!(matches!(
        error(&unit),
        CompileErrorKind::KindMismatch {
            site: MismatchSite::Condition,
            found: Kind::String,
            ..
        }
    ));
}

#[test]
fn test_assignment_targets() {
    let literal = program(vec![main(vec![expr_stmt(assign(int(1), int(2)))])]);
    assert_eq!(error(&literal), CompileErrorKind::NotAssignable);

    let constant = program(vec![main(vec![expr_stmt(assign(ident("TRUE"), int(0)))])]);
    assert_eq!(error(&constant), CompileErrorKind::NotAssignable);

    let narrowing = program(vec![main(vec![
        var(Kind::Int, "n", int(0)),
        expr_stmt(assign(ident("n"), float(1.5))),
    ])]);
    assert!(matches!(
        error(&narrowing),
        CompileErrorKind::KindMismatch {
            site: MismatchSite::Assignment,
            ..
        }
    ));
}

#[test]
fn test_switch_labels() {
    let duplicate = program(vec![main(vec![switch(
        int(1),
        vec![(CaseLabel::Int(2), vec![]), (CaseLabel::Int(2), vec![])],
    )])]);
    assert_eq!(error(&duplicate), CompileErrorKind::DuplicateCaseLabel("2".into()));

    let wrong_kind = program(vec![main(vec![switch(
        int(1),
        vec![(CaseLabel::String("a".into()), vec![])],
    )])]);
    assert!(matches!(
        error(&wrong_kind),
        CompileErrorKind::KindMismatch {
            site: MismatchSite::CaseLabel,
            ..
        }
    ));

    let float_subject = program(vec![main(vec![switch(float(1.0), vec![])])]);
    assert!(matches!(
        error(&float_subject),
        CompileErrorKind::KindMismatch {
            site: MismatchSite::SwitchSubject,
            ..
        }
    ));
}

#[test]
fn test_struct_errors() {
    let unknown = program(vec![main(vec![declare(Kind::Struct("Missing".into()), vec![("s", None)])])]);
    assert_eq!(error(&unknown), CompileErrorKind::UnknownStruct("Missing".into()));

    let no_field = program(vec![
        structure("Pair", vec![("a", Kind::Int)]),
        main(vec![
            declare(Kind::Struct("Pair".into()), vec![("p", None)]),
            expr_stmt(field(ident("p"), "b")),
        ]),
    ]);
    assert!(matches!(error(&no_field), CompileErrorKind::UnknownField { .. }));
}

#[test]
fn test_invalid_variable_kinds() {
    let void_var = program(vec![main(vec![declare(Kind::Void, vec![("v", None)])])]);
    assert!(matches!(
        error(&void_var),
        CompileErrorKind::InvalidVariableKind { kind: Kind::Void, .. }
    ));

    let action_param = program(vec![
        function("run", Kind::Void, vec![param("a", Kind::Action)], vec![]),
        main(vec![]),
    ]);
    assert!(matches!(
        error(&action_param),
        CompileErrorKind::InvalidVariableKind { kind: Kind::Action, .. }
    ));
}

#[test]
fn test_error_display_includes_location() {
    let unit = program(vec![main(vec![at(3, brk())])]);
    let err = nwscript_compiler::compile(&unit, RoutineTable::builtin()).unwrap_err();
    assert_eq!(err.span, Span::new(0, 0, 3));
    assert!(err.to_string().contains("line 3"));
}
