#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Expression
//!
//! Template and expression evaluation for node configurations.
//!
//! Configuration fields may embed `{{ expression }}` placeholders. A
//! [`Template`] splits a field into static text and expression sources; each
//! source parses into an [`Expr`] and evaluates against an [`Environment`]
//! that supplies the message root (`$`), the `config` scope, and functions
//! such as `secrets(...)`.
//!
//! - [`Template`] — `{{ }}` scanning, whole-field detection
//! - [`parse_expression`] / [`Expr`] — the expression language
//! - [`Evaluator`] / [`Environment`] — evaluation with pluggable context
//! - [`ValuePath`] — dotted paths addressing configuration fields
//!
//! The crate knows nothing about workflows or stores; callers provide
//! environments that do.

mod ast;
mod error;
mod eval;
mod parser;
mod path;
mod template;
mod token;

pub use ast::Expr;
pub use error::ExpressionError;
pub use eval::{
    Environment, Evaluator, MAX_RECURSION_DEPTH, PayloadEnvironment, calls_function,
    evaluate_source,
};
pub use parser::parse_expression;
pub use path::{PathSegment, ValuePath};
pub use template::{MAX_TEMPLATE_EXPRESSIONS, Position, Template, TemplatePart};
