//! The execution record and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sirocco_core::{EventId, ExecutionId, NodeId, WorkflowId};

use crate::error::ExecutionError;
use crate::transition::validate_execution_transition;

/// Metadata key the async handle is stored under.
const ASYNC_ID: &str = "async_id";

/// Metadata key recording who requested a cancellation.
const CANCELLED_BY: &str = "cancelled_by";

/// Metadata key listing configuration paths with deferred expressions.
const DEFERRED_PATHS: &str = "deferred_paths";

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Claimed but not yet started.
    Pending,
    /// Work is in flight.
    Started,
    /// Settled; see [`ExecutionResult`] for how.
    Finished,
}

impl ExecutionState {
    /// Whether the execution has settled.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Valid state moves: `pending -> started -> finished`, with a shortcut
    /// straight to `finished` for cancellations and early failures.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Started | Self::Finished) | (Self::Started, Self::Finished)
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// How a finished execution settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    /// Completed and produced its outputs.
    Passed,
    /// Ended in an error.
    Failed,
    /// Stopped on request before settling on its own.
    Cancelled,
}

impl ExecutionResult {
    /// Whether this result counts as a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Refinement of an [`ExecutionResult`].
///
/// `error_resolved` is only ever reached through [`Execution::resolve_error`],
/// an operator action acknowledging a failure after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    /// Nothing remarkable.
    Ok,
    /// The failure still needs attention.
    Error,
    /// The failure was acknowledged by an operator.
    ErrorResolved,
}

impl std::fmt::Display for ResultReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
            Self::ErrorResolved => write!(f, "error_resolved"),
        }
    }
}

/// A single run of a node against one input event.
///
/// Executions are append-only history: they are never deleted, and once
/// finished they only change through [`Execution::resolve_error`]. The
/// `previous_execution_id` link points at the execution that produced this
/// one's input event, forming the backward chain the expression resolver
/// walks. The `parent_execution_id` link points at the surrounding blueprint
/// execution, forming the tree that failure cascades climb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution id.
    pub id: ExecutionId,
    /// Workflow the executing node belongs to.
    pub workflow_id: WorkflowId,
    /// The executing node.
    pub node_id: NodeId,
    /// Event consumed as input.
    pub event_id: EventId,
    /// Root event at the origin of this chain.
    pub root_event_id: EventId,
    /// Execution that produced the input event, if any.
    #[serde(default)]
    pub previous_execution_id: Option<ExecutionId>,
    /// Enclosing blueprint execution, if this node runs nested.
    #[serde(default)]
    pub parent_execution_id: Option<ExecutionId>,
    /// Lifecycle state.
    pub state: ExecutionState,
    /// Set once the execution finishes.
    #[serde(default)]
    pub result: Option<ExecutionResult>,
    /// Refinement of `result`; `None` for cancellations.
    #[serde(default)]
    pub result_reason: Option<ResultReason>,
    /// Human-readable failure message, if any.
    #[serde(default)]
    pub failure_message: Option<String>,
    /// Node configuration as resolved at claim time. Frozen: later edits to
    /// the node do not reach an execution already in flight.
    #[serde(default)]
    pub configuration: Value,
    /// Free-form scratch space (async handles, cancellation audit, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Claim timestamp.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// When work actually began.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution settled.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Creates a pending execution for `node_id` consuming `event_id`.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        node_id: NodeId,
        event_id: EventId,
        root_event_id: EventId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::v4(),
            workflow_id,
            node_id,
            event_id,
            root_event_id,
            previous_execution_id: None,
            parent_execution_id: None,
            state: ExecutionState::Pending,
            result: None,
            result_reason: None,
            failure_message: None,
            configuration: Value::Null,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Links the execution that produced this one's input event.
    #[must_use]
    pub fn with_previous_execution(mut self, id: ExecutionId) -> Self {
        self.previous_execution_id = Some(id);
        self
    }

    /// Links the enclosing blueprint execution.
    #[must_use]
    pub fn with_parent_execution(mut self, id: ExecutionId) -> Self {
        self.parent_execution_id = Some(id);
        self
    }

    /// Freezes the resolved node configuration into the record.
    #[must_use]
    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Whether the execution has settled.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the execution is still pending or in flight.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Finished with result `passed`.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.result == Some(ExecutionResult::Passed)
    }

    /// Finished with result `failed`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.result == Some(ExecutionResult::Failed)
    }

    /// Finished with result `cancelled`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.result == Some(ExecutionResult::Cancelled)
    }

    /// Failed and not yet acknowledged by an operator.
    #[must_use]
    pub fn has_unresolved_error(&self) -> bool {
        self.is_failed() && self.result_reason == Some(ResultReason::Error)
    }

    /// Moves `pending -> started`.
    pub fn start(&mut self) -> Result<(), ExecutionError> {
        validate_execution_transition(self.state, ExecutionState::Started)?;
        self.state = ExecutionState::Started;
        let now = Utc::now();
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Settles a started execution as `finished / passed / ok`.
    pub fn pass(&mut self) -> Result<(), ExecutionError> {
        if self.state != ExecutionState::Started {
            return Err(ExecutionError::invalid_transition(
                self.state,
                ExecutionState::Finished,
            ));
        }
        self.finish(ExecutionResult::Passed, Some(ResultReason::Ok));
        Ok(())
    }

    /// Settles the execution as `finished / failed` with the given reason.
    ///
    /// Legal from both `pending` and `started`: failure cascades reach
    /// executions that never got to start.
    pub fn fail(
        &mut self,
        reason: ResultReason,
        message: Option<String>,
    ) -> Result<(), ExecutionError> {
        validate_execution_transition(self.state, ExecutionState::Finished)?;
        self.failure_message = message;
        self.finish(ExecutionResult::Failed, Some(reason));
        Ok(())
    }

    /// Settles the execution as `finished / cancelled`, recording who asked.
    pub fn cancel(&mut self, cancelled_by: impl Into<String>) -> Result<(), ExecutionError> {
        validate_execution_transition(self.state, ExecutionState::Finished)?;
        self.set_metadata(CANCELLED_BY, Value::String(cancelled_by.into()));
        self.finish(ExecutionResult::Cancelled, None);
        Ok(())
    }

    /// Acknowledges a failure: `failed / error -> failed / error_resolved`.
    ///
    /// The only mutation allowed on a finished execution.
    pub fn resolve_error(&mut self) -> Result<(), ExecutionError> {
        if !self.has_unresolved_error() {
            return Err(ExecutionError::not_resolvable(
                self.state,
                self.result,
                self.result_reason,
            ));
        }
        self.result_reason = Some(ResultReason::ErrorResolved);
        self.updated_at = Utc::now();
        Ok(())
    }

    fn finish(&mut self, result: ExecutionResult, reason: Option<ResultReason>) {
        self.state = ExecutionState::Finished;
        self.result = Some(result);
        self.result_reason = reason;
        let now = Utc::now();
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Stores a metadata entry, replacing any previous value for `key`.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    /// Looks up a metadata entry.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Handle of the external asynchronous work, if this execution is
    /// waiting on any.
    #[must_use]
    pub fn async_id(&self) -> Option<&str> {
        self.metadata.get(ASYNC_ID).and_then(Value::as_str)
    }

    /// Records the handle of external asynchronous work.
    pub fn set_async_id(&mut self, id: impl Into<String>) {
        self.set_metadata(ASYNC_ID, Value::String(id.into()));
    }

    /// Who requested the cancellation, if the execution was cancelled.
    #[must_use]
    pub fn cancelled_by(&self) -> Option<&str> {
        self.metadata.get(CANCELLED_BY).and_then(Value::as_str)
    }

    /// Configuration paths whose resolution was deferred to dispatch time.
    #[must_use]
    pub fn deferred_paths(&self) -> Vec<String> {
        self.metadata
            .get(DEFERRED_PATHS)
            .and_then(Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records which configuration paths were deferred to dispatch time.
    pub fn set_deferred_paths(&mut self, paths: Vec<String>) {
        self.set_metadata(
            DEFERRED_PATHS,
            Value::Array(paths.into_iter().map(Value::String).collect()),
        );
    }
}
