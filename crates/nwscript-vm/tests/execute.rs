//! Compile small units and run them on the reference machine.

use nwscript_abi::{RoutineDescriptor, RoutineTable};
use nwscript_ast::build::*;
use nwscript_ast::{AssignOp, BinaryOp, CaseLabel, Program, Spanned, Stmt, UnaryOp};
use nwscript_types::Kind;
use nwscript_vm::{ActionState, Host, HostResult, Outcome, Value, Vm};

/// Records every engine call and answers a couple of routines.
#[derive(Default)]
struct Recorder {
    calls: Vec<(String, Vec<Value>)>,
    actions: Vec<ActionState>,
}

impl Recorder {
    fn called(&self, name: &str) -> Vec<&Vec<Value>> {
        self.calls
            .iter()
            .filter(|(routine, _)| routine == name)
            .map(|(_, args)| args)
            .collect()
    }
}

impl Host for Recorder {
    fn call(&mut self, routine: &RoutineDescriptor, args: Vec<Value>) -> HostResult {
        for arg in &args {
            if let Value::Action(state) = arg {
                self.actions.push(state.clone());
            }
        }
        let result = match (routine.name.as_str(), args.first()) {
            ("GetStringLength", Some(Value::String(s))) => HostResult::Return(Value::Int(s.len() as i32)),
            ("Random", _) => HostResult::Return(Value::Int(0)),
            _ if routine.returns == Kind::Void => HostResult::Void,
            _ => HostResult::Unhandled,
        };
        self.calls.push((routine.name.clone(), args));
        result
    }
}

/// Compile, push through the NCS encoding and run.
fn execute(unit: &Program) -> (Outcome, Recorder) {
    let table = RoutineTable::builtin();
    let compiled = nwscript_compiler::compile(unit, table).unwrap();
    let bytes = compiled.to_ncs().unwrap();
    let decoded = nwscript_bytecode::Program::from_ncs(&bytes).unwrap();
    assert_eq!(decoded, compiled);

    let mut host = Recorder::default();
    let outcome = Vm::new(&decoded, table).run(&mut host).unwrap();
    (outcome, host)
}

fn conditional(body: Vec<Spanned<Stmt>>) -> Program {
    program(vec![function("StartingConditional", Kind::Int, vec![], body)])
}

fn returns(unit: &Program) -> i32 {
    let (outcome, _) = execute(unit);
    assert_eq!(outcome.stack.len(), 1, "entry result should be the only cell left");
    outcome.return_value().and_then(Value::as_int).unwrap()
}

#[test]
fn test_sequential_declarations() {
    let unit = conditional(vec![
        var(Kind::Int, "x", int(1)),
        var(Kind::Int, "y", add(ident("x"), int(1))),
        ret(ident("y")),
    ]);
    assert_eq!(returns(&unit), 2);
}

#[test]
fn test_inner_scope_shadows_outer() {
    let shadowed = conditional(vec![
        var(Kind::Int, "x", int(1)),
        block(vec![var(Kind::Int, "x", int(2)), ret(ident("x"))]),
    ]);
    assert_eq!(returns(&shadowed), 2);

    let intact = conditional(vec![
        var(Kind::Int, "x", int(1)),
        block(vec![var(Kind::Int, "x", int(2))]),
        ret(ident("x")),
    ]);
    assert_eq!(returns(&intact), 1);
}

#[test]
fn test_for_with_break_and_continue() {
    let unit = conditional(vec![
        var(Kind::Int, "total", int(0)),
        declare(Kind::Int, vec![("i", None)]),
        for_(
            Some(assign(ident("i"), int(0))),
            Some(lt(ident("i"), int(10))),
            Some(unary(UnaryOp::PostIncrement, ident("i"))),
            vec![
                if_(eq(ident("i"), int(5)), vec![cont()]),
                if_(eq(ident("i"), int(8)), vec![brk()]),
                expr_stmt(compound(AssignOp::Add, ident("total"), ident("i"))),
            ],
        ),
        ret(ident("total")),
    ]);
    assert_eq!(returns(&unit), 1 + 2 + 3 + 4 + 6 + 7);
}

#[test]
fn test_break_pops_loop_locals() {
    let unit = conditional(vec![
        var(Kind::Int, "n", int(7)),
        while_(
            int(1),
            vec![var(Kind::Int, "t", int(5)), var(Kind::Int, "u", int(6)), brk()],
        ),
        ret(ident("n")),
    ]);
    assert_eq!(returns(&unit), 7);
}

#[test]
fn test_do_while_runs_body_first() {
    let unit = conditional(vec![
        var(Kind::Int, "n", int(0)),
        do_while(
            vec![expr_stmt(compound(AssignOp::Add, ident("n"), int(3)))],
            lt(ident("n"), int(10)),
        ),
        ret(ident("n")),
    ]);
    assert_eq!(returns(&unit), 12);
}

#[test]
fn test_string_switch_falls_through() {
    let body = |subject: &str| {
        conditional(vec![
            var(Kind::String, "s", string(subject)),
            var(Kind::Int, "r", int(0)),
            switch(
                ident("s"),
                vec![
                    (
                        CaseLabel::String("a".into()),
                        vec![expr_stmt(assign(ident("r"), int(1))), brk()],
                    ),
                    (
                        CaseLabel::String("b".into()),
                        vec![expr_stmt(assign(ident("r"), int(2)))],
                    ),
                    (
                        CaseLabel::String("c".into()),
                        vec![expr_stmt(compound(AssignOp::Add, ident("r"), int(10))), brk()],
                    ),
                    (CaseLabel::Default, vec![expr_stmt(assign(ident("r"), int(100)))]),
                ],
            ),
            ret(ident("r")),
        ])
    };
    assert_eq!(returns(&body("a")), 1);
    assert_eq!(returns(&body("b")), 12);
    assert_eq!(returns(&body("c")), 10);
    assert_eq!(returns(&body("zzz")), 100);
}

#[test]
fn test_increment_forms() {
    let unit = conditional(vec![
        var(Kind::Int, "i", int(5)),
        var(Kind::Int, "a", unary(UnaryOp::PostIncrement, ident("i"))),
        var(Kind::Int, "b", unary(UnaryOp::PreIncrement, ident("i"))),
        ret(add(
            add(
                binary(BinaryOp::Mul, ident("a"), int(100)),
                binary(BinaryOp::Mul, ident("b"), int(10)),
            ),
            ident("i"),
        )),
    ]);
    assert_eq!(returns(&unit), 577);
}

#[test]
fn test_recursion_through_prototype() {
    let unit = program(vec![
        prototype("fact", Kind::Int, vec![param("n", Kind::Int)]),
        function(
            "StartingConditional",
            Kind::Int,
            vec![],
            vec![ret(call("fact", vec![int(5)]))],
        ),
        function(
            "fact",
            Kind::Int,
            vec![param("n", Kind::Int)],
            vec![
                if_(
                    binary(BinaryOp::Le, ident("n"), int(1)),
                    vec![ret(int(1))],
                ),
                ret(binary(
                    BinaryOp::Mul,
                    ident("n"),
                    call("fact", vec![binary(BinaryOp::Sub, ident("n"), int(1))]),
                )),
            ],
        ),
    ]);
    assert_eq!(returns(&unit), 120);
}

#[test]
fn test_user_defaults_and_argument_order() {
    let unit = program(vec![
        function(
            "scale",
            Kind::Int,
            vec![
                param("v", Kind::Int),
                param_default("factor", Kind::Int, nwscript_types::ConstValue::Int(3)),
            ],
            vec![ret(binary(BinaryOp::Sub, ident("v"), ident("factor")))],
        ),
        function(
            "StartingConditional",
            Kind::Int,
            vec![],
            vec![ret(add(
                binary(BinaryOp::Mul, call("scale", vec![int(10)]), int(100)),
                call("scale", vec![int(10), int(4)]),
            ))],
        ),
    ]);
    assert_eq!(returns(&unit), 7 * 100 + 6);
}

#[test]
fn test_globals_visible_from_functions() {
    let unit = program(vec![
        global(Kind::Int, vec![("g", Some(int(10))), ("h", Some(add(ident("g"), int(1))))]),
        function(
            "bump",
            Kind::Void,
            vec![],
            vec![
                expr_stmt(compound(AssignOp::Add, ident("g"), int(5))),
                expr_stmt(unary(UnaryOp::PreIncrement, ident("h"))),
            ],
        ),
        function(
            "StartingConditional",
            Kind::Int,
            vec![],
            vec![
                expr_stmt(call("bump", vec![])),
                ret(binary(BinaryOp::Mul, ident("g"), ident("h"))),
            ],
        ),
    ]);
    assert_eq!(returns(&unit), 15 * 12);
}

#[test]
fn test_global_initializer_calls_function_reading_globals() {
    let unit = program(vec![
        global(Kind::Int, vec![("g", Some(int(5)))]),
        function(
            "twice",
            Kind::Int,
            vec![],
            vec![ret(binary(BinaryOp::Mul, ident("g"), int(2)))],
        ),
        global(Kind::Int, vec![("h", Some(call("twice", vec![])))]),
        function("StartingConditional", Kind::Int, vec![], vec![ret(ident("h"))]),
    ]);
    assert_eq!(returns(&unit), 10);
}

#[test]
fn test_struct_and_vector_fields() {
    let unit = program(vec![
        structure("Pair", vec![("a", Kind::Int), ("pos", Kind::Vector)]),
        function(
            "StartingConditional",
            Kind::Int,
            vec![],
            vec![
                declare(Kind::Struct("Pair".into()), vec![("p", None)]),
                expr_stmt(assign(field(ident("p"), "a"), int(3))),
                expr_stmt(assign(field(field(ident("p"), "pos"), "y"), float(2.5))),
                if_(
                    eq(field(field(ident("p"), "pos"), "y"), float(2.5)),
                    vec![ret(field(ident("p"), "a"))],
                ),
                ret(int(0)),
            ],
        ),
    ]);
    assert_eq!(returns(&unit), 3);
}

#[test]
fn test_short_circuit_skips_right_operand() {
    let unit = conditional(vec![
        if_(
            binary(BinaryOp::And, ident("FALSE"), call("Random", vec![int(2)])),
            vec![ret(int(1))],
        ),
        if_(
            binary(BinaryOp::Or, ident("TRUE"), call("Random", vec![int(3)])),
            vec![ret(int(2))],
        ),
        ret(int(3)),
    ]);
    let (outcome, host) = execute(&unit);
    assert_eq!(outcome.return_value(), Some(&Value::Int(2)));
    assert!(host.called("Random").is_empty());
}

#[test]
fn test_engine_arguments_in_declaration_order() {
    let unit = program(vec![main(vec![
        expr_stmt(call("PrintFloat", vec![int(3)])),
        var(Kind::Int, "len", call("GetStringLength", vec![string("abcd")])),
        expr_stmt(call("PrintInteger", vec![ident("len")])),
        var(Kind::Vector, "v", vector(1.0, 2.0, 3.0)),
        expr_stmt(call(
            "VectorMagnitude",
            vec![binary(BinaryOp::Mul, ident("v"), float(2.0))],
        )),
    ])]);
    let (outcome, host) = execute(&unit);
    assert!(outcome.stack.is_empty());
    assert_eq!(
        host.called("PrintFloat"),
        vec![&vec![Value::Float(3.0), Value::Int(18), Value::Int(9)]]
    );
    assert_eq!(host.called("PrintInteger"), vec![&vec![Value::Int(4)]]);
    assert_eq!(
        host.called("VectorMagnitude"),
        vec![&vec![Value::Vector([2.0, 4.0, 6.0])]]
    );
}

#[test]
fn test_delayed_action_captures_locals_and_globals() {
    let unit = program(vec![
        global(Kind::Int, vec![("base", Some(int(100)))]),
        main(vec![
            var(Kind::Int, "n", int(4)),
            expr_stmt(call(
                "DelayCommand",
                vec![
                    float(1.5),
                    call("PrintInteger", vec![add(ident("base"), ident("n"))]),
                ],
            )),
            expr_stmt(assign(ident("n"), int(50))),
        ]),
    ]);
    let (_, mut host) = execute(&unit);
    assert!(host.called("PrintInteger").is_empty());
    assert_eq!(host.called("DelayCommand")[0][0], Value::Float(1.5));
    assert_eq!(host.actions.len(), 1);

    let table = RoutineTable::builtin();
    let compiled = nwscript_compiler::compile(&unit, table).unwrap();
    let state = host.actions.remove(0);
    Vm::new(&compiled, table).run_action(&state, &mut host).unwrap();
    assert_eq!(host.called("PrintInteger"), vec![&vec![Value::Int(104)]]);
}
