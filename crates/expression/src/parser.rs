//! Recursive-descent parser for expression sources.

use serde_json::{Number, Value};

use crate::ast::Expr;
use crate::error::ExpressionError;
use crate::token::{Spanned, Token, tokenize};

/// Nesting cap for the parser. Postfix chains are iterative, so only
/// constructs like `a[b[c[...]]]` and call arguments count against it.
const MAX_PARSE_DEPTH: usize = 64;

/// Parses one expression source (the text between `{{` and `}}`).
pub fn parse_expression(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.chars().count(),
    };
    let expr = parser.expression(0)?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::parse(
            format!("unexpected {}", token.kind.describe()),
            token.offset,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Offset reported for errors at end of input.
    end: usize,
}

impl Parser {
    /// expression := primary (`.` ident | `[` expression `]`)*
    fn expression(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        if depth >= MAX_PARSE_DEPTH {
            return Err(ExpressionError::RecursionLimit);
        }
        let mut expr = self.primary(depth)?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = self.expect_ident()?;
                    expr = Expr::Property {
                        target: Box::new(expr),
                        name,
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression(depth + 1)?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// primary := `$` | literal | `-` number | ident | ident `(` args `)`
    fn primary(&mut self, depth: usize) -> Result<Expr, ExpressionError> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return Err(ExpressionError::parse(
                "unexpected end of expression",
                self.end,
            ));
        };
        self.pos += 1;

        match token.kind {
            Token::Dollar => Ok(Expr::Root),
            Token::Str(text) => Ok(Expr::Literal(Value::String(text))),
            Token::Int(value) => Ok(Expr::Literal(Value::from(value))),
            Token::Float(value) => float_literal(value, token.offset),
            Token::Minus => match self.tokens.get(self.pos).cloned() {
                Some(Spanned {
                    kind: Token::Int(value),
                    ..
                }) => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::from(-value)))
                }
                Some(Spanned {
                    kind: Token::Float(value),
                    offset,
                }) => {
                    self.pos += 1;
                    float_literal(-value, offset)
                }
                _ => Err(ExpressionError::parse(
                    "expected a number after '-'",
                    token.offset,
                )),
            },
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let args = self.arguments(depth)?;
                    Ok(Expr::Call {
                        function: name,
                        args,
                    })
                }
                _ => Ok(Expr::Identifier(name)),
            },
            other => Err(ExpressionError::parse(
                format!("unexpected {}", other.describe()),
                token.offset,
            )),
        }
    }

    fn arguments(&mut self, depth: usize) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression(depth + 1)?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn expect(&mut self, token: &Token) -> Result<(), ExpressionError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&token.describe()))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ExpressionError> {
        match self.tokens.get(self.pos).cloned() {
            Some(Spanned {
                kind: Token::Ident(name),
                ..
            }) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("a property name")),
        }
    }

    fn unexpected(&self, expected: &str) -> ExpressionError {
        match self.tokens.get(self.pos) {
            Some(token) => ExpressionError::parse(
                format!("expected {expected}, found {}", token.kind.describe()),
                token.offset,
            ),
            None => ExpressionError::parse(
                format!("expected {expected}, found end of expression"),
                self.end,
            ),
        }
    }
}

fn float_literal(value: f64, offset: usize) -> Result<Expr, ExpressionError> {
    Number::from_f64(value)
        .map(|n| Expr::Literal(Value::Number(n)))
        .ok_or_else(|| ExpressionError::parse("number is not representable", offset))
}
