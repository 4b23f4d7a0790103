//! Token scanning for expression sources.

use crate::error::ExpressionError;

/// A lexical token of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `$`, the message root.
    Dollar,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `-`
    Minus,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// A name: `[A-Za-z_][A-Za-z0-9_]*`.
    Ident(String),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// A quoted string literal.
    Str(String),
}

impl Token {
    /// Human-readable form for parse errors.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Dollar => "'$'".to_owned(),
            Self::Dot => "'.'".to_owned(),
            Self::Comma => "','".to_owned(),
            Self::Minus => "'-'".to_owned(),
            Self::LBracket => "'['".to_owned(),
            Self::RBracket => "']'".to_owned(),
            Self::LParen => "'('".to_owned(),
            Self::RParen => "')'".to_owned(),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Int(_) | Self::Float(_) => "number".to_owned(),
            Self::Str(_) => "string".to_owned(),
        }
    }
}

/// A token plus the character offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub(crate) kind: Token,
    pub(crate) offset: usize,
}

/// Scans an expression source into tokens.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let offset = i;
        let kind = match c {
            '$' => {
                i += 1;
                Token::Dollar
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '\'' | '"' => {
                let (text, next) = scan_string(&chars, i)?;
                i = next;
                Token::Str(text)
            }
            c if c.is_ascii_digit() => {
                let (token, next) = scan_number(&chars, i)?;
                i = next;
                token
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    name.push(chars[i]);
                    i += 1;
                }
                Token::Ident(name)
            }
            other => {
                return Err(ExpressionError::parse(
                    format!("unexpected character '{other}'"),
                    offset,
                ));
            }
        };
        tokens.push(Spanned { kind, offset });
    }

    Ok(tokens)
}

/// Scans a quoted string starting at `start` (the opening quote). Returns the
/// unescaped text and the index past the closing quote.
fn scan_string(chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    return Err(ExpressionError::parse("unterminated string", start));
                };
                let replacement = match escaped {
                    '\\' => '\\',
                    '\'' => '\'',
                    '"' => '"',
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => {
                        return Err(ExpressionError::parse(
                            format!("unsupported escape '\\{other}'"),
                            i,
                        ));
                    }
                };
                text.push(replacement);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ExpressionError::parse("unterminated string", start))
}

/// Scans an unsigned number starting at `start`. A `.` followed by a digit
/// turns it into a float; otherwise the `.` is left for the caller.
fn scan_number(chars: &[char], start: usize) -> Result<(Token, usize), ExpressionError> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }

    let is_float =
        chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(char::is_ascii_digit);
    if is_float {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        let value: f64 = text
            .parse()
            .map_err(|_| ExpressionError::parse(format!("invalid number '{text}'"), start))?;
        return Ok((Token::Float(value), i));
    }

    let text: String = chars[start..i].iter().collect();
    let value: i64 = text
        .parse()
        .map_err(|_| ExpressionError::parse(format!("invalid number '{text}'"), start))?;
    Ok((Token::Int(value), i))
}
