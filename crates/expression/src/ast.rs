//! Parsed expression trees.

use serde_json::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `$`, the message root.
    Root,
    /// A bare name, resolved by the environment (`config`, ...).
    Identifier(String),
    /// A literal: string, number, boolean, or null.
    Literal(Value),
    /// `target.name`
    Property {
        /// The value whose property is accessed.
        target: Box<Expr>,
        /// The property name.
        name: String,
    },
    /// `target[index]`
    Index {
        /// The value being indexed.
        target: Box<Expr>,
        /// The index expression.
        index: Box<Expr>,
    },
    /// `function(arg, ...)`
    Call {
        /// The function name.
        function: String,
        /// Argument expressions, in call order.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Whether the expression contains a call to `function` anywhere,
    /// including inside indexes and arguments.
    #[must_use]
    pub fn calls(&self, function: &str) -> bool {
        match self {
            Self::Root | Self::Identifier(_) | Self::Literal(_) => false,
            Self::Property { target, .. } => target.calls(function),
            Self::Index { target, index } => target.calls(function) || index.calls(function),
            Self::Call { function: name, args } => {
                name == function || args.iter().any(|arg| arg.calls(function))
            }
        }
    }
}
