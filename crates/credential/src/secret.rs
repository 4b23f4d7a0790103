//! A string wrapper that keeps secret material out of logs and snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret value: zeroed on drop, redacted everywhere it could leak.
///
/// `Debug`, `Display`, and `Serialize` all produce `[REDACTED]`, so a secret
/// that strays into a log line or a persisted snapshot shows up as the marker
/// rather than the material. Reading the value requires [`expose_secret`],
/// which confines it to a closure.
///
/// [`expose_secret`]: SecretString::expose_secret
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Runs `f` over the secret. The `&str` cannot outlive the closure, so
    /// copies have to be deliberate.
    pub fn expose_secret<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.inner)
    }

    /// Whether the secret is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for SecretString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}
