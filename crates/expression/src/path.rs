//! Dotted paths into JSON values.

use std::fmt;

use serde_json::Value;

/// One step of a [`ValuePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object key.
    Key(String),
    /// An array position.
    Index(usize),
}

/// A path into a JSON value, written `a.b[0].c`.
///
/// Paths address configuration fields: where an expression was found, or
/// where expressions are not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ValuePath {
    segments: Vec<PathSegment>,
}

impl ValuePath {
    /// The empty path, addressing the value itself.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses `a.b[0].c`. A dotted segment that is purely numeric is read as
    /// an array index, so `a.0.c` and `a[0].c` address the same place.
    /// Parsing is lenient; text that fits no form becomes a key.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut path = Self::root();
        for part in text.split('.') {
            if part.is_empty() {
                continue;
            }
            let (head, brackets) = match part.find('[') {
                Some(open) => part.split_at(open),
                None => (part, ""),
            };
            if !head.is_empty() {
                match head.parse::<usize>() {
                    Ok(index) => path.push_index(index),
                    Err(_) => path.push_key(head),
                }
            }
            for group in brackets.split('[') {
                let inner = group.trim_end_matches(']');
                if inner.is_empty() {
                    continue;
                }
                let inner = inner.trim_matches(|c| c == '\'' || c == '"');
                match inner.parse::<usize>() {
                    Ok(index) => path.push_index(index),
                    Err(_) => path.push_key(inner),
                }
            }
        }
        path
    }

    /// Appends an object key.
    pub fn push_key(&mut self, key: impl Into<String>) {
        self.segments.push(PathSegment::Key(key.into()));
    }

    /// Appends an array index.
    pub fn push_index(&mut self, index: usize) {
        self.segments.push(PathSegment::Index(index));
    }

    /// Removes the last segment.
    pub fn pop(&mut self) {
        self.segments.pop();
    }

    /// The segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Whether the path is empty.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Follows the path into `value`.
    #[must_use]
    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match segment {
                PathSegment::Key(key) => current.get(key.as_str())?,
                PathSegment::Index(index) => current.get(*index)?,
            };
        }
        Some(current)
    }

    /// Follows the path into `value`, mutably.
    pub fn lookup_mut<'v>(&self, value: &'v mut Value) -> Option<&'v mut Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match segment {
                PathSegment::Key(key) => current.get_mut(key.as_str())?,
                PathSegment::Index(index) => current.get_mut(*index)?,
            };
        }
        Some(current)
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
            first = false;
        }
        Ok(())
    }
}
