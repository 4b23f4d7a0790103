//! The engine's error type.

use sirocco_core::ExecutionId;
use sirocco_credential::CredentialError;
use sirocco_execution::ExecutionError;
use sirocco_executor::ExecutorError;
use sirocco_expression::ExpressionError;
use sirocco_join::JoinError;
use sirocco_store::StoreError;
use sirocco_workflow::WorkflowError;
use thiserror::Error;

/// Anything an orchestration operation can fail with.
///
/// Errors from the lower crates pass through transparently; the engine adds
/// only the variants that exist at its own level: configuration resolution
/// (which knows the failing path) and the cancel-the-root rule.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A workflow definition problem (unknown node, ambiguous name, ...).
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// An illegal execution state transition.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A secret could not be loaded.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// An executor failed to start or check work.
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// The aggregator rejected an event.
    #[error(transparent)]
    Join(#[from] JoinError),

    /// A configuration field failed to resolve. The path names the field.
    #[error("resolution of configuration path '{path}' failed: {source}")]
    Resolution {
        /// Dotted path of the failing field inside the configuration tree.
        path: String,
        /// The underlying expression failure.
        #[source]
        source: ExpressionError,
    },

    /// Cancellation was requested on a nested execution. Only roots may be
    /// cancelled; the tree is cancelled from the top.
    #[error("execution {0} has a parent; cancel the root execution instead")]
    ChildCancellation(ExecutionId),
}

impl EngineError {
    /// Builds a [`EngineError::Resolution`] for the field at `path`.
    #[must_use]
    pub fn resolution(path: impl Into<String>, source: ExpressionError) -> Self {
        Self::Resolution {
            path: path.into(),
            source,
        }
    }
}
