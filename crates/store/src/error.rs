//! Error types for store operations.

use sirocco_core::{EventId, ExecutionId, FieldSetId, NodeId, WorkflowId};
use sirocco_execution::FieldSetState;
use thiserror::Error;

/// Errors raised by [`Store`](crate::Store) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No workflow row with the given id.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    /// No node row with the given id.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// No event row with the given id.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// No execution row with the given id.
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// No field set row with the given id.
    #[error("field set not found: {0}")]
    FieldSetNotFound(FieldSetId),

    /// [`Store::close_field_set`](crate::Store::close_field_set) was asked
    /// to "close" a set back to `open`.
    #[error("a field set cannot be closed to {0}")]
    InvalidCloseState(FieldSetState),

    /// Backend-specific failure (connection loss, serialization, ...).
    ///
    /// The in-memory store never produces this; it exists for durable
    /// implementations to map their transport errors into.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wraps a backend-specific failure message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
