//! Error types for template and expression handling.

use thiserror::Error;

/// Errors raised while scanning templates, parsing expressions, or
/// evaluating them.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// A `{{` without its matching `}}`.
    #[error("unclosed expression opened at line {line}, column {column}")]
    UnclosedExpression {
        /// Line of the opening braces (1-based).
        line: usize,
        /// Column of the opening braces (1-based).
        column: usize,
    },

    /// A `{{ }}` with nothing inside.
    #[error("empty expression at line {line}, column {column}")]
    EmptyExpression {
        /// Line of the opening braces (1-based).
        line: usize,
        /// Column of the opening braces (1-based).
        column: usize,
    },

    /// A template with more placeholders than the scanner accepts.
    #[error("template exceeds {limit} expressions")]
    TooManyExpressions {
        /// The scanner's cap.
        limit: usize,
    },

    /// The expression source is not well-formed.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// What went wrong.
        message: String,
        /// Character offset into the expression source.
        offset: usize,
    },

    /// A bare identifier that names no known scope.
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// A call to a function the environment does not provide.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Property access on an object that lacks the property.
    #[error("property '{0}' not found")]
    PropertyNotFound(String),

    /// Property access on a value that is not an object.
    #[error("cannot access property '{property}' of {kind}")]
    NotAnObject {
        /// The property that was asked for.
        property: String,
        /// What the value actually was.
        kind: &'static str,
    },

    /// Index outside the array bounds.
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        /// The requested index (may be negative).
        index: i64,
        /// The array length.
        len: usize,
    },

    /// Indexing a value kind that does not support it.
    #[error("cannot index {kind} with {with}")]
    NotIndexable {
        /// What the indexed value was.
        kind: &'static str,
        /// What the index evaluated to.
        with: &'static str,
    },

    /// The expression nests deeper than the evaluator allows.
    #[error("expression recursion limit reached")]
    RecursionLimit,

    /// Failure reported by the evaluation environment (unresolvable node
    /// reference, missing config scope, secret lookup failure, ...).
    #[error("{0}")]
    Environment(String),
}

impl ExpressionError {
    /// Builds a [`ExpressionError::Parse`].
    #[must_use]
    pub fn parse(message: impl Into<String>, offset: usize) -> Self {
        Self::Parse {
            message: message.into(),
            offset,
        }
    }

    /// Builds an [`ExpressionError::Environment`].
    #[must_use]
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }
}

/// Short name for a JSON value's kind, used in access errors.
#[must_use]
pub(crate) fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
