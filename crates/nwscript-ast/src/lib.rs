//! Syntax tree for NWScript compilation units.
//!
//! The tree is produced by a front end (lexer and parser live outside this
//! workspace) and handed to `nwscript-compiler` already well-formed. Every
//! node that can fail lowering carries a [`Span`] so diagnostics point back
//! at the source.
//!
//! All types are serde-serializable; the command line tools read trees as
//! JSON.

pub mod build;

use nwscript_types::{ConstValue, Kind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte range of a node in its source file, plus the 1-based start line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32) -> Self {
        Self { start, end, line }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} ({}..{})", self.line, self.start, self.end)
    }
}

/// A spanned AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    #[serde(default)]
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A complete compilation unit (one script plus its includes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Spanned<Item>>,
}

/// Top-level items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    /// struct Name { ... };
    Struct(StructDecl),
    /// A global variable declaration.
    Global(Declaration),
    /// A function prototype (no body) or definition.
    Function(FunctionDecl),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Spanned<FieldDecl>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub returns: Kind,
    pub params: Vec<Spanned<ParamDecl>>,
    /// `None` for a prototype.
    pub body: Option<Vec<Spanned<Stmt>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub kind: Kind,
    #[serde(default)]
    pub default: Option<ConstValue>,
}

/// `kind a = 1, b, c = a + 1;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: Kind,
    pub declarators: Vec<Spanned<Declarator>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub name: String,
    #[serde(default)]
    pub init: Option<Spanned<Expr>>,
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Declaration(Declaration),
    Expr(Spanned<Expr>),
    If {
        condition: Spanned<Expr>,
        then_branch: Box<Spanned<Stmt>>,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },
    While {
        condition: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },
    DoWhile {
        body: Box<Spanned<Stmt>>,
        condition: Spanned<Expr>,
    },
    For {
        init: Option<Spanned<Expr>>,
        condition: Option<Spanned<Expr>>,
        step: Option<Spanned<Expr>>,
        body: Box<Spanned<Stmt>>,
    },
    Switch {
        subject: Spanned<Expr>,
        cases: Vec<SwitchCase>,
    },
    Return(Option<Spanned<Expr>>),
    Break,
    Continue,
    Block(Vec<Spanned<Stmt>>),
}

/// One `case`/`default` label and the statements up to the next label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub label: Spanned<CaseLabel>,
    pub body: Vec<Spanned<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseLabel {
    Int(i32),
    String(String),
    Default,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(ConstValue),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Spanned<Expr>>,
        right: Box<Spanned<Expr>>,
    },
    Assign {
        op: AssignOp,
        target: Box<Spanned<Expr>>,
        value: Box<Spanned<Expr>>,
    },
    Call {
        function: String,
        args: Vec<Spanned<Expr>>,
    },
    /// `base.field` on a struct or vector.
    Field {
        base: Box<Spanned<Expr>>,
        field: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// -
    Neg,
    /// !
    Not,
    /// ~
    BitNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// && (short-circuit)
    And,
    /// || (short-circuit)
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    /// >>>
    UShr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// =
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl AssignOp {
    /// Operator applied before storing, `None` for plain `=`.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
            AssignOp::UShr => Some(BinaryOp::UShr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_json_roundtrip_shape() {
        let json = r#"{
            "items": [{
                "node": {"Function": {
                    "name": "main",
                    "returns": "void",
                    "params": [],
                    "body": [{"node": {"Declaration": {
                        "kind": "int",
                        "declarators": [{"node": {"name": "x", "init": {"node": {"Literal": {"int": 1}}}}}]
                    }}}]
                }},
                "span": {"start": 0, "end": 20, "line": 1}
            }]
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(program.items.len(), 1);
        assert_eq!(program.items[0].span.line, 1);
        match &program.items[0].node {
            Item::Function(func) => {
                assert_eq!(func.name, "main");
                assert_eq!(func.returns, Kind::Void);
                let body = func.body.as_ref().unwrap();
                assert!(matches!(body[0].node, Stmt::Declaration(_)));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_compound_assignment_operator() {
        assert_eq!(AssignOp::Assign.binary(), None);
        assert_eq!(AssignOp::Add.binary(), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::UShr.symbol(), ">>>");
    }
}
