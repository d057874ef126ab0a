//! Terse constructors for syntax trees.
//!
//! Front ends and tests use these to assemble trees without spelling out
//! every `Spanned` wrapper. Nodes built here carry a default span unless
//! [`at`] is used.

use crate::{
    AssignOp, BinaryOp, CaseLabel, Declaration, Declarator, Expr, FieldDecl, FunctionDecl, Item,
    ParamDecl, Program, Span, Spanned, Stmt, StructDecl, SwitchCase, UnaryOp,
};
use nwscript_types::{ConstValue, Kind};

fn spanned<T>(node: T) -> Spanned<T> {
    Spanned::new(node, Span::default())
}

/// Re-span a node onto `line`.
pub fn at<T>(line: u32, mut node: Spanned<T>) -> Spanned<T> {
    node.span = Span::new(0, 0, line);
    node
}

pub fn program(items: Vec<Spanned<Item>>) -> Program {
    Program { items }
}

// === Items ===

pub fn function(
    name: &str,
    returns: Kind,
    params: Vec<Spanned<ParamDecl>>,
    body: Vec<Spanned<Stmt>>,
) -> Spanned<Item> {
    spanned(Item::Function(FunctionDecl {
        name: name.to_string(),
        returns,
        params,
        body: Some(body),
    }))
}

pub fn prototype(name: &str, returns: Kind, params: Vec<Spanned<ParamDecl>>) -> Spanned<Item> {
    spanned(Item::Function(FunctionDecl {
        name: name.to_string(),
        returns,
        params,
        body: None,
    }))
}

pub fn main(body: Vec<Spanned<Stmt>>) -> Spanned<Item> {
    function("main", Kind::Void, Vec::new(), body)
}

pub fn param(name: &str, kind: Kind) -> Spanned<ParamDecl> {
    spanned(ParamDecl {
        name: name.to_string(),
        kind,
        default: None,
    })
}

pub fn param_default(name: &str, kind: Kind, default: ConstValue) -> Spanned<ParamDecl> {
    spanned(ParamDecl {
        name: name.to_string(),
        kind,
        default: Some(default),
    })
}

pub fn global(kind: Kind, declarators: Vec<(&str, Option<Spanned<Expr>>)>) -> Spanned<Item> {
    spanned(Item::Global(declaration(kind, declarators)))
}

pub fn structure(name: &str, fields: Vec<(&str, Kind)>) -> Spanned<Item> {
    spanned(Item::Struct(StructDecl {
        name: name.to_string(),
        fields: fields
            .into_iter()
            .map(|(name, kind)| {
                spanned(FieldDecl {
                    name: name.to_string(),
                    kind,
                })
            })
            .collect(),
    }))
}

// === Statements ===

fn declaration(kind: Kind, declarators: Vec<(&str, Option<Spanned<Expr>>)>) -> Declaration {
    Declaration {
        kind,
        declarators: declarators
            .into_iter()
            .map(|(name, init)| {
                spanned(Declarator {
                    name: name.to_string(),
                    init,
                })
            })
            .collect(),
    }
}

/// `kind name = init;`
pub fn var(kind: Kind, name: &str, init: Spanned<Expr>) -> Spanned<Stmt> {
    declare(kind, vec![(name, Some(init))])
}

/// `kind a = .., b, c = ..;`
pub fn declare(kind: Kind, declarators: Vec<(&str, Option<Spanned<Expr>>)>) -> Spanned<Stmt> {
    spanned(Stmt::Declaration(declaration(kind, declarators)))
}

pub fn expr_stmt(expr: Spanned<Expr>) -> Spanned<Stmt> {
    spanned(Stmt::Expr(expr))
}

pub fn if_(condition: Spanned<Expr>, then_branch: Vec<Spanned<Stmt>>) -> Spanned<Stmt> {
    spanned(Stmt::If {
        condition,
        then_branch: Box::new(block(then_branch)),
        else_branch: None,
    })
}

pub fn if_else(
    condition: Spanned<Expr>,
    then_branch: Vec<Spanned<Stmt>>,
    else_branch: Vec<Spanned<Stmt>>,
) -> Spanned<Stmt> {
    spanned(Stmt::If {
        condition,
        then_branch: Box::new(block(then_branch)),
        else_branch: Some(Box::new(block(else_branch))),
    })
}

pub fn while_(condition: Spanned<Expr>, body: Vec<Spanned<Stmt>>) -> Spanned<Stmt> {
    spanned(Stmt::While {
        condition,
        body: Box::new(block(body)),
    })
}

pub fn do_while(body: Vec<Spanned<Stmt>>, condition: Spanned<Expr>) -> Spanned<Stmt> {
    spanned(Stmt::DoWhile {
        body: Box::new(block(body)),
        condition,
    })
}

pub fn for_(
    init: Option<Spanned<Expr>>,
    condition: Option<Spanned<Expr>>,
    step: Option<Spanned<Expr>>,
    body: Vec<Spanned<Stmt>>,
) -> Spanned<Stmt> {
    spanned(Stmt::For {
        init,
        condition,
        step,
        body: Box::new(block(body)),
    })
}

pub fn switch(subject: Spanned<Expr>, cases: Vec<(CaseLabel, Vec<Spanned<Stmt>>)>) -> Spanned<Stmt> {
    spanned(Stmt::Switch {
        subject,
        cases: cases
            .into_iter()
            .map(|(label, body)| SwitchCase {
                label: spanned(label),
                body,
            })
            .collect(),
    })
}

pub fn ret(value: Spanned<Expr>) -> Spanned<Stmt> {
    spanned(Stmt::Return(Some(value)))
}

pub fn ret_void() -> Spanned<Stmt> {
    spanned(Stmt::Return(None))
}

pub fn brk() -> Spanned<Stmt> {
    spanned(Stmt::Break)
}

pub fn cont() -> Spanned<Stmt> {
    spanned(Stmt::Continue)
}

pub fn block(stmts: Vec<Spanned<Stmt>>) -> Spanned<Stmt> {
    spanned(Stmt::Block(stmts))
}

// === Expressions ===

pub fn int(value: i32) -> Spanned<Expr> {
    lit(ConstValue::Int(value))
}

pub fn float(value: f32) -> Spanned<Expr> {
    lit(ConstValue::Float(value))
}

pub fn string(value: &str) -> Spanned<Expr> {
    lit(ConstValue::String(value.to_string()))
}

pub fn vector(x: f32, y: f32, z: f32) -> Spanned<Expr> {
    lit(ConstValue::Vector([x, y, z]))
}

pub fn lit(value: ConstValue) -> Spanned<Expr> {
    spanned(Expr::Literal(value))
}

pub fn ident(name: &str) -> Spanned<Expr> {
    spanned(Expr::Identifier(name.to_string()))
}

pub fn unary(op: UnaryOp, operand: Spanned<Expr>) -> Spanned<Expr> {
    spanned(Expr::Unary {
        op,
        operand: Box::new(operand),
    })
}

pub fn binary(op: BinaryOp, left: Spanned<Expr>, right: Spanned<Expr>) -> Spanned<Expr> {
    spanned(Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn add(left: Spanned<Expr>, right: Spanned<Expr>) -> Spanned<Expr> {
    binary(BinaryOp::Add, left, right)
}

pub fn lt(left: Spanned<Expr>, right: Spanned<Expr>) -> Spanned<Expr> {
    binary(BinaryOp::Lt, left, right)
}

pub fn eq(left: Spanned<Expr>, right: Spanned<Expr>) -> Spanned<Expr> {
    binary(BinaryOp::Eq, left, right)
}

pub fn assign(target: Spanned<Expr>, value: Spanned<Expr>) -> Spanned<Expr> {
    compound(AssignOp::Assign, target, value)
}

pub fn compound(op: AssignOp, target: Spanned<Expr>, value: Spanned<Expr>) -> Spanned<Expr> {
    spanned(Expr::Assign {
        op,
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn call(function: &str, args: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    spanned(Expr::Call {
        function: function.to_string(),
        args,
    })
}

pub fn field(base: Spanned<Expr>, field: &str) -> Spanned<Expr> {
    spanned(Expr::Field {
        base: Box::new(base),
        field: field.to_string(),
    })
}
