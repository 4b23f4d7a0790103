//! Node (graph vertex) definition and state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use sirocco_core::{NodeId, WorkflowId};

use crate::error::WorkflowError;

/// What kind of vertex a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Entry point producing root events (webhook, schedule, ...).
    Trigger,
    /// Ordinary executable step.
    Component,
    /// Reusable sub-graph; its internal nodes expand into child executions
    /// under a single parent execution.
    Blueprint,
    /// Presentation-only vertex; never executed by the engine core.
    Widget,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trigger => "trigger",
            Self::Component => "component",
            Self::Blueprint => "blueprint",
            Self::Widget => "widget",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a node.
///
/// `ready` nodes are claimable; `processing` nodes own exactly one in-flight
/// execution; `paused` suppresses the automatic return to `ready` when an
/// execution finishes; `error` is reserved for administrative quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Claimable: the next queue item may open an execution.
    Ready,
    /// An execution is in flight; the node cannot be claimed again.
    Processing,
    /// Excluded from claiming until an explicit resume.
    Paused,
    /// Administratively quarantined; only a manual reset reopens it.
    Error,
}

impl NodeState {
    /// Returns `true` if the state machine permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Ready, Self::Processing | Self::Paused | Self::Error)
                | (Self::Processing, Self::Ready | Self::Paused | Self::Error)
                | (Self::Paused, Self::Ready | Self::Processing)
                | (Self::Error, Self::Ready)
        )
    }

    /// Returns `true` if the node may be claimed by a worker.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Validate a node state transition, returning a typed error on violation.
pub fn validate_node_transition(from: NodeState, to: NodeState) -> Result<(), WorkflowError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(WorkflowError::invalid_transition(from, to))
    }
}

/// A single vertex inside a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier.
    pub id: NodeId,
    /// The workflow this node belongs to.
    pub workflow_id: WorkflowId,
    /// Human-readable name; expressions reference nodes by it.
    pub name: String,
    /// What kind of vertex this is.
    pub node_type: NodeType,
    /// Current lifecycle state.
    pub state: NodeState,
    /// Registry key of the executor backing this node.
    pub component: String,
    /// Declarative configuration; `{{ }}` placeholders are resolved per
    /// execution.
    #[serde(default)]
    pub configuration: serde_json::Value,
    /// Dotted configuration paths the component schema marks as
    /// expression-free; the resolver leaves them byte-for-byte untouched.
    #[serde(default)]
    pub disallow_expression: Vec<String>,
    /// Set on internal nodes created by a blueprint expansion; points at the
    /// blueprint node they were expanded from.
    #[serde(default)]
    pub parent_node_id: Option<NodeId>,
}

impl Node {
    /// Create a node in the `ready` state with empty configuration.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        name: impl Into<String>,
        node_type: NodeType,
        component: impl Into<String>,
    ) -> Self {
        Self {
            id: NodeId::v4(),
            workflow_id,
            name: name.into(),
            node_type,
            state: NodeState::Ready,
            component: component.into(),
            configuration: serde_json::Value::Null,
            disallow_expression: Vec::new(),
            parent_node_id: None,
        }
    }

    /// Set the declarative configuration tree.
    #[must_use]
    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Mark a dotted configuration path as expression-free.
    #[must_use]
    pub fn with_disallowed_expression(mut self, path: impl Into<String>) -> Self {
        self.disallow_expression.push(path.into());
        self
    }

    /// Mark this node as expanded from a blueprint node.
    #[must_use]
    pub fn with_parent_node(mut self, parent: NodeId) -> Self {
        self.parent_node_id = Some(parent);
        self
    }

    /// Returns `true` if this node was expanded from a blueprint.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.parent_node_id.is_some()
    }
}
