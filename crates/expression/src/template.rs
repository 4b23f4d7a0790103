//! Template scanning: splitting text around `{{ }}` placeholders.

use crate::error::ExpressionError;

/// Upper bound on placeholders per template; a guard against pathological
/// inputs, far above anything a real configuration field carries.
pub const MAX_TEMPLATE_EXPRESSIONS: usize = 1000;

/// Location of a placeholder within its template (1-based line/column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Line of the opening braces.
    pub line: usize,
    /// Column of the opening braces.
    pub column: usize,
    /// Character offset of the opening braces.
    pub offset: usize,
}

/// One segment of a scanned template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text, passed through untouched.
    Static(String),
    /// A placeholder body (the text between `{{` and `}}`, trimmed).
    Expression {
        /// Trimmed expression source.
        source: String,
        /// Where the placeholder opened.
        position: Position,
    },
}

/// A template string split into static text and expression placeholders.
///
/// Scanning is purely lexical: expression bodies are extracted, not parsed.
/// The first `}}` closes a placeholder, so expression sources cannot contain
/// that sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Scans `input` into parts.
    ///
    /// Errors on an unclosed `{{`, an empty `{{ }}`, or more than
    /// [`MAX_TEMPLATE_EXPRESSIONS`] placeholders.
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let chars: Vec<char> = input.chars().collect();
        let mut parts = Vec::new();
        let mut buffer = String::new();
        let mut expressions = 0usize;

        let mut i = 0;
        let mut line = 1;
        let mut column = 1;

        while i < chars.len() {
            if chars[i] == '{' && chars.get(i + 1) == Some(&'{') {
                let position = Position { line, column, offset: i };
                if !buffer.is_empty() {
                    parts.push(TemplatePart::Static(std::mem::take(&mut buffer)));
                }

                // Find the closing braces, keeping line/column current.
                let mut j = i + 2;
                let (mut eline, mut ecolumn) = (line, column + 2);
                let mut close = None;
                while j < chars.len() {
                    if chars[j] == '}' && chars.get(j + 1) == Some(&'}') {
                        close = Some(j);
                        break;
                    }
                    if chars[j] == '\n' {
                        eline += 1;
                        ecolumn = 1;
                    } else {
                        ecolumn += 1;
                    }
                    j += 1;
                }
                let Some(close) = close else {
                    return Err(ExpressionError::UnclosedExpression {
                        line: position.line,
                        column: position.column,
                    });
                };

                let source: String = chars[i + 2..close].iter().collect();
                let source = source.trim().to_owned();
                if source.is_empty() {
                    return Err(ExpressionError::EmptyExpression {
                        line: position.line,
                        column: position.column,
                    });
                }
                expressions += 1;
                if expressions > MAX_TEMPLATE_EXPRESSIONS {
                    return Err(ExpressionError::TooManyExpressions {
                        limit: MAX_TEMPLATE_EXPRESSIONS,
                    });
                }
                parts.push(TemplatePart::Expression { source, position });

                i = close + 2;
                line = eline;
                column = ecolumn + 2;
                continue;
            }

            if chars[i] == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
            buffer.push(chars[i]);
            i += 1;
        }

        if !buffer.is_empty() {
            parts.push(TemplatePart::Static(buffer));
        }
        Ok(Self { parts })
    }

    /// The scanned parts, in input order.
    #[must_use]
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Whether the template contains any placeholder.
    #[must_use]
    pub fn has_expressions(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, TemplatePart::Expression { .. }))
    }

    /// Number of placeholders.
    #[must_use]
    pub fn expression_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, TemplatePart::Expression { .. }))
            .count()
    }

    /// Expression sources, in input order.
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            TemplatePart::Expression { source, .. } => Some(source.as_str()),
            TemplatePart::Static(_) => None,
        })
    }

    /// If the template is exactly one placeholder and nothing else, its
    /// source. This is the whole-field case that preserves the resolved
    /// value's native type.
    #[must_use]
    pub fn as_single_expression(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [TemplatePart::Expression { source, .. }] => Some(source),
            _ => None,
        }
    }
}
