//! Error types for execution records.

use crate::record::{ExecutionResult, ExecutionState, ResultReason};

/// Errors raised by execution lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A state move not permitted by the lifecycle.
    #[error("invalid execution transition from {from} to {to}")]
    InvalidTransition {
        /// State the execution was in.
        from: ExecutionState,
        /// State the caller asked for.
        to: ExecutionState,
    },

    /// Error resolution attempted on an execution that is not
    /// `finished / failed / error`.
    #[error("execution is not resolvable: {found}")]
    NotResolvable {
        /// What the execution actually looked like.
        found: String,
    },

    /// Payload or metadata could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExecutionError {
    /// Builds an [`ExecutionError::InvalidTransition`].
    #[must_use]
    pub const fn invalid_transition(from: ExecutionState, to: ExecutionState) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Builds an [`ExecutionError::NotResolvable`] describing the current
    /// state triple.
    #[must_use]
    pub fn not_resolvable(
        state: ExecutionState,
        result: Option<ExecutionResult>,
        reason: Option<ResultReason>,
    ) -> Self {
        let result = result.map_or_else(|| "none".to_owned(), |r| r.to_string());
        let reason = reason.map_or_else(|| "none".to_owned(), |r| r.to_string());
        Self::NotResolvable {
            found: format!("state {state}, result {result}, reason {reason}"),
        }
    }
}
