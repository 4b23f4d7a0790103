//! Expression evaluation against a pluggable environment.

use serde_json::Value;

use crate::ast::Expr;
use crate::error::{ExpressionError, value_kind};
use crate::parser::parse_expression;

/// Evaluation nesting cap. Parsed expressions stay well under it; the guard
/// protects against hand-built trees.
pub const MAX_RECURSION_DEPTH: usize = 256;

/// What an expression can see while it evaluates.
///
/// The language itself only knows `$`, bare identifiers, property and index
/// access, literals, and calls. Everything contextual (which payloads `$`
/// exposes, what `config` means, which functions exist) comes from the
/// environment.
pub trait Environment {
    /// The value of `$` itself.
    fn message_root(&self) -> Result<Value, ExpressionError>;

    /// The value of `$.name`. Environments decide what names mean: a plain
    /// payload exposes its own fields, a workflow context exposes node
    /// contributions.
    fn message_property(&self, name: &str) -> Result<Value, ExpressionError>;

    /// The value of the `config` identifier.
    fn config_scope(&self) -> Result<Value, ExpressionError>;

    /// A function call with already-evaluated arguments.
    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ExpressionError>;
}

/// Walks an [`Expr`] and produces its value.
pub struct Evaluator<'e, E: Environment + ?Sized> {
    env: &'e E,
}

impl<'e, E: Environment + ?Sized> Evaluator<'e, E> {
    /// Creates an evaluator over `env`.
    pub fn new(env: &'e E) -> Self {
        Self { env }
    }

    /// Evaluates a parsed expression.
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        self.eval(expr, 0)
    }

    fn eval(&self, expr: &Expr, depth: usize) -> Result<Value, ExpressionError> {
        if depth >= MAX_RECURSION_DEPTH {
            return Err(ExpressionError::RecursionLimit);
        }
        match expr {
            Expr::Root => self.env.message_root(),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Identifier(name) => match name.as_str() {
                "config" => self.env.config_scope(),
                other => Err(ExpressionError::UnknownIdentifier(other.to_owned())),
            },
            Expr::Property { target, name } => {
                // `$.name` is the environment's lookup, not plain field
                // access; deeper accesses are plain.
                if matches!(**target, Expr::Root) {
                    return self.env.message_property(name);
                }
                let value = self.eval(target, depth + 1)?;
                access_property(&value, name)
            }
            Expr::Index { target, index } => {
                let index = self.eval(index, depth + 1)?;
                let value = self.eval(target, depth + 1)?;
                access_index(&value, &index)
            }
            Expr::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, depth + 1)?);
                }
                self.env.call(function, &values)
            }
        }
    }
}

/// Parses and evaluates `source` in one step.
pub fn evaluate_source<E>(source: &str, env: &E) -> Result<Value, ExpressionError>
where
    E: Environment + ?Sized,
{
    let expr = parse_expression(source)?;
    Evaluator::new(env).evaluate(&expr)
}

/// Whether `source` calls `function`. Sources that fail to parse are judged
/// textually, so a secret-bearing expression is never misread as plain.
#[must_use]
pub fn calls_function(source: &str, function: &str) -> bool {
    match parse_expression(source) {
        Ok(expr) => expr.calls(function),
        Err(_) => source.contains(&format!("{function}(")),
    }
}

/// An environment over a single payload: `$` is the payload, `$.name` its
/// fields. No configuration scope, no functions.
#[derive(Debug, Clone, Copy)]
pub struct PayloadEnvironment<'a> {
    payload: &'a Value,
}

impl<'a> PayloadEnvironment<'a> {
    /// Wraps a payload.
    #[must_use]
    pub fn new(payload: &'a Value) -> Self {
        Self { payload }
    }
}

impl Environment for PayloadEnvironment<'_> {
    fn message_root(&self) -> Result<Value, ExpressionError> {
        Ok(self.payload.clone())
    }

    fn message_property(&self, name: &str) -> Result<Value, ExpressionError> {
        access_property(self.payload, name)
    }

    fn config_scope(&self) -> Result<Value, ExpressionError> {
        Err(ExpressionError::environment(
            "no configuration scope in this context",
        ))
    }

    fn call(&self, function: &str, _args: &[Value]) -> Result<Value, ExpressionError> {
        Err(ExpressionError::UnknownFunction(function.to_owned()))
    }
}

/// Reads `value.name`, requiring an object that has the property.
pub(crate) fn access_property(value: &Value, name: &str) -> Result<Value, ExpressionError> {
    match value {
        Value::Object(map) => map
            .get(name)
            .cloned()
            .ok_or_else(|| ExpressionError::PropertyNotFound(name.to_owned())),
        other => Err(ExpressionError::NotAnObject {
            property: name.to_owned(),
            kind: value_kind(other),
        }),
    }
}

/// Reads `value[index]`. Arrays take integer indexes, negative counting from
/// the end; objects take string indexes.
pub(crate) fn access_index(value: &Value, index: &Value) -> Result<Value, ExpressionError> {
    match (value, index) {
        (Value::Array(items), Value::Number(n)) => {
            let Some(raw) = n.as_i64() else {
                return Err(ExpressionError::NotIndexable {
                    kind: "array",
                    with: "float",
                });
            };
            let len = items.len();
            let resolved = if raw < 0 { raw + len as i64 } else { raw };
            usize::try_from(resolved)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or(ExpressionError::IndexOutOfBounds { index: raw, len })
        }
        (Value::Object(_), Value::String(name)) => access_property(value, name),
        (value, index) => Err(ExpressionError::NotIndexable {
            kind: value_kind(value),
            with: value_kind(index),
        }),
    }
}
