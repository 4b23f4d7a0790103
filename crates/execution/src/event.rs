//! Events: addressed payloads flowing between nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sirocco_core::{EventId, ExecutionId, NodeId};

/// Routing state of an [`Event`].
///
/// Every event starts out `pending`. The router consumes pending events,
/// fans them out into queue items (or join buffers) and marks them `routed`.
/// Routed events are kept: executions reference them as their input and the
/// expression resolver walks back over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Waiting for the router to pick it up.
    Pending,
    /// Already fanned out; retained for history and payload lookups.
    Routed,
}

impl EventState {
    /// Whether the router still has to process this event.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Routed => write!(f, "routed"),
        }
    }
}

/// A payload addressed at a node, on a named output channel.
///
/// Events produced by a finishing execution carry that execution's id;
/// events injected from outside (triggers, tests, manual runs) carry none
/// and are *root* events, the origin of an execution chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id.
    pub id: EventId,
    /// Node this event is addressed to (for produced events: the producer;
    /// routing resolves the consumers via the workflow's edges).
    pub node_id: NodeId,
    /// Output channel the payload left on.
    pub channel: String,
    /// The data itself.
    pub payload: Value,
    /// Routing state.
    pub state: EventState,
    /// Execution that produced this event, if any.
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates a root event: injected from outside, no producing execution.
    #[must_use]
    pub fn root(node_id: NodeId, channel: impl Into<String>, payload: Value) -> Self {
        Self {
            id: EventId::v4(),
            node_id,
            channel: channel.into(),
            payload,
            state: EventState::Pending,
            execution_id: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an event emitted by a finishing execution.
    #[must_use]
    pub fn produced(
        node_id: NodeId,
        channel: impl Into<String>,
        payload: Value,
        execution_id: ExecutionId,
    ) -> Self {
        Self {
            id: EventId::v4(),
            node_id,
            channel: channel.into(),
            payload,
            state: EventState::Pending,
            execution_id: Some(execution_id),
            created_at: Utc::now(),
        }
    }

    /// A root event has no producing execution.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.execution_id.is_none()
    }

    /// Marks the event as fanned out by the router.
    pub fn mark_routed(&mut self) {
        self.state = EventState::Routed;
    }
}
