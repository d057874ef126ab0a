//! Loader for `nwscript.nss` declaration files.
//!
//! Only the declaration subset is understood: constant definitions
//! (`int NAME = value;`) and routine prototypes
//! (`kind Name(kind param = default, ...);`). Preprocessor lines and comments
//! are skipped. Routine ids are assigned in order of appearance.

use crate::{AbiError, Param, RoutineDescriptor};
use indexmap::IndexMap;
use logos::Logos;
use nwscript_types::{ConstValue, Kind, OBJECT_INVALID, OBJECT_SELF};
use std::ops::Range;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
#[logos(skip r"#[^\n]*")]
enum Token<'src> {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident(&'src str),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i32>().ok())]
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| u32::from_str_radix(&lex.slice()[2..], 16).ok().map(|v| v as i32))]
    Int(i32),

    #[regex(r"[0-9]+\.[0-9]*[fF]?", parse_float)]
    #[regex(r"[0-9]+[fF]", parse_float)]
    Float(f32),

    #[regex(r#""([^"\\\n]|\\.)*""#, unescape)]
    Str(String),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("=")]
    Equals,
    #[token("-")]
    Minus,
}

fn parse_float<'src>(lex: &mut logos::Lexer<'src, Token<'src>>) -> Option<f32> {
    lex.slice().trim_end_matches(['f', 'F']).parse().ok()
}

fn unescape<'src>(lex: &mut logos::Lexer<'src, Token<'src>>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            other => out.push(other),
        }
    }
    Some(out)
}

#[derive(Debug)]
pub(crate) struct Parsed {
    pub routines: Vec<RoutineDescriptor>,
    pub by_name: IndexMap<String, usize>,
    pub constants: IndexMap<String, ConstValue>,
}

pub(crate) fn parse(source: &str) -> Result<Parsed, AbiError> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(AbiError::Declaration {
                    line: line_of(source, span.start),
                    message: format!("unexpected input `{}`", &source[span]),
                })
            }
        }
    }

    let mut constants = IndexMap::new();
    constants.insert("OBJECT_SELF".to_string(), ConstValue::Object(OBJECT_SELF));
    constants.insert("OBJECT_INVALID".to_string(), ConstValue::Object(OBJECT_INVALID));

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        parsed: Parsed {
            routines: Vec::new(),
            by_name: IndexMap::new(),
            constants,
        },
    };
    while !parser.at_end() {
        parser.declaration()?;
    }
    Ok(parser.parsed)
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    parsed: Parsed,
}

impl<'src> Parser<'src> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Result<Token<'src>, AbiError> {
        match self.tokens.get(self.pos) {
            Some((token, _)) => {
                self.pos += 1;
                Ok(token.clone())
            }
            None => Err(self.error("unexpected end of file")),
        }
    }

    fn error(&self, message: impl Into<String>) -> AbiError {
        let offset = self
            .tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, span)| span.start)
            .unwrap_or(0);
        AbiError::Declaration {
            line: line_of(self.source, offset),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token<'src>, what: &str) -> Result<(), AbiError> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            self.pos -= 1;
            Err(self.error(format!("expected {what}, found {token:?}")))
        }
    }

    fn ident(&mut self) -> Result<&'src str, AbiError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected identifier, found {other:?}")))
            }
        }
    }

    fn kind(&mut self) -> Result<Kind, AbiError> {
        let word = self.ident()?;
        Kind::from_keyword(word).ok_or_else(|| {
            self.pos -= 1;
            self.error(format!("unknown type `{word}`"))
        })
    }

    fn declaration(&mut self) -> Result<(), AbiError> {
        let kind = self.kind()?;
        let name = self.ident()?;
        match self.next()? {
            Token::LParen => self.prototype(kind, name),
            Token::Equals => {
                let value = self.value()?;
                let value = self.coerce(value, &kind, name)?;
                self.expect(Token::Semicolon, "`;`")?;
                if self.parsed.constants.insert(name.to_string(), value).is_some() {
                    return Err(self.error(format!("constant `{name}` defined twice")));
                }
                Ok(())
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected `(` or `=` after `{name}`, found {other:?}")))
            }
        }
    }

    fn prototype(&mut self, returns: Kind, name: &str) -> Result<(), AbiError> {
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                let kind = self.kind()?;
                if kind == Kind::Void {
                    return Err(self.error(format!("parameter of `{name}` declared void")));
                }
                let param_name = self.ident()?;
                let mut param = Param::new(param_name, kind);
                if self.peek() == Some(&Token::Equals) {
                    self.pos += 1;
                    let value = self.value()?;
                    param.default = Some(self.coerce(value, &param.kind, param_name)?);
                } else if params.last().is_some_and(|p: &Param| p.default.is_some()) {
                    return Err(self.error(format!(
                        "parameter `{param_name}` of `{name}` follows a defaulted parameter"
                    )));
                }
                params.push(param);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "`)`")?;
        self.expect(Token::Semicolon, "`;`")?;

        let index = self.parsed.routines.len();
        let id = u16::try_from(index).map_err(|_| self.error("routine table overflows u16 ids"))?;
        if self.parsed.by_name.insert(name.to_string(), index).is_some() {
            return Err(self.error(format!("routine `{name}` declared twice")));
        }
        self.parsed.routines.push(RoutineDescriptor {
            id,
            name: name.to_string(),
            params,
            returns,
        });
        Ok(())
    }

    /// Literal, negated literal, constant reference or `[x, y, z]`.
    fn value(&mut self) -> Result<ConstValue, AbiError> {
        match self.next()? {
            Token::Int(value) => Ok(ConstValue::Int(value)),
            Token::Float(value) => Ok(ConstValue::Float(value)),
            Token::Str(value) => Ok(ConstValue::String(value)),
            Token::Minus => match self.next()? {
                Token::Int(value) => Ok(ConstValue::Int(value.wrapping_neg())),
                Token::Float(value) => Ok(ConstValue::Float(-value)),
                other => {
                    self.pos -= 1;
                    Err(self.error(format!("expected number after `-`, found {other:?}")))
                }
            },
            Token::Ident(name) => self
                .parsed
                .constants
                .get(name)
                .cloned()
                .ok_or_else(|| self.error(format!("unknown constant `{name}`"))),
            Token::LBracket => {
                let mut components = [0.0f32; 3];
                for (i, component) in components.iter_mut().enumerate() {
                    if i > 0 {
                        self.expect(Token::Comma, "`,`")?;
                    }
                    *component = match self.value()? {
                        ConstValue::Float(value) => value,
                        ConstValue::Int(value) => value as f32,
                        other => return Err(self.error(format!("vector component {other} is not a number"))),
                    };
                }
                self.expect(Token::RBracket, "`]`")?;
                Ok(ConstValue::Vector(components))
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected a value, found {other:?}")))
            }
        }
    }

    fn coerce(&self, value: ConstValue, kind: &Kind, name: &str) -> Result<ConstValue, AbiError> {
        if let (ConstValue::Int(handle), Kind::Object) = (&value, kind) {
            return Ok(ConstValue::Object(*handle as u32));
        }
        value
            .coerce(kind)
            .ok_or_else(|| self.error(format!("`{name}` is {kind} but its value is {}", value.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototypes_numbered_in_order() {
        let parsed = parse(
            "int Random(int nMax);\n\
             void PrintString(string s);\n",
        )
        .unwrap();
        assert_eq!(parsed.routines.len(), 2);
        assert_eq!(parsed.routines[1].id, 1);
        assert_eq!(parsed.routines[1].name, "PrintString");
        assert_eq!(parsed.by_name["Random"], 0);
    }

    #[test]
    fn test_defaults_resolve_constants_and_widen() {
        let parsed = parse(
            "int TRUE = 1;\n\
             void Move(object o = OBJECT_SELF, int bRun = TRUE, float fRange = 1, vector v = [0.0, 1, -2.5f]);\n",
        )
        .unwrap();
        let params = &parsed.routines[0].params;
        assert_eq!(params[0].default, Some(ConstValue::Object(OBJECT_SELF)));
        assert_eq!(params[1].default, Some(ConstValue::Int(1)));
        assert_eq!(params[2].default, Some(ConstValue::Float(1.0)));
        assert_eq!(params[3].default, Some(ConstValue::Vector([0.0, 1.0, -2.5])));
    }

    #[test]
    fn test_comments_and_preprocessor_skipped() {
        let parsed = parse(
            "#define ENGINE_STRUCTURE_0 effect\n\
             /* block\n comment */\n\
             // line comment\n\
             string NAME = \"a\\\"b\";\n\
             int HEX = 0x10;\n",
        )
        .unwrap();
        assert_eq!(parsed.constants["NAME"], ConstValue::String("a\"b".into()));
        assert_eq!(parsed.constants["HEX"], ConstValue::Int(16));
    }

    #[test]
    fn test_errors_carry_line() {
        let err = parse("int A = 1;\n\nvoid F(int a = \"x\");\n").unwrap_err();
        match err {
            AbiError::Declaration { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_routine_rejected() {
        assert!(parse("void F();\nvoid F();\n").is_err());
    }
}
