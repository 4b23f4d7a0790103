//! Workflow-specific error types.

use sirocco_core::NodeId;
use thiserror::Error;

use crate::node::NodeState;

/// Errors that can occur during workflow definition, validation, or graph construction.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow name must not be empty.
    #[error("workflow name must not be empty")]
    EmptyName,

    /// Workflow must have at least one node.
    #[error("workflow must have at least one node")]
    NoNodes,

    /// Duplicate node id found.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    /// An edge or connection references a node that does not exist.
    #[error("reference to unknown node: {0}")]
    UnknownNode(NodeId),

    /// No node carries the given name.
    #[error("no node named '{0}'")]
    UnknownNodeName(String),

    /// More than one node carries the given name, so a name reference
    /// cannot be resolved.
    #[error("ambiguous node name '{0}': multiple nodes share it")]
    AmbiguousNodeName(String),

    /// An edge has the same source and target node.
    #[error("self-loop detected on node: {0}")]
    SelfLoop(NodeId),

    /// The workflow graph contains a cycle.
    #[error("cycle detected in workflow graph")]
    CycleDetected,

    /// Every node has incoming edges, so there is no place to start execution.
    #[error("workflow has no entry nodes (all nodes have incoming edges)")]
    NoEntryNodes,

    /// A connection group declares no grouping fields.
    #[error("connection group on node {0} has no grouping fields")]
    EmptyGroupFields(NodeId),

    /// A connection group declares no connections.
    #[error("connection group on node {0} has no connections")]
    EmptyGroupConnections(NodeId),

    /// Two connections within one group share a name.
    #[error("duplicate connection name '{name}' in group on node {node_id}")]
    DuplicateConnectionName {
        /// The consumer node owning the group.
        node_id: NodeId,
        /// The repeated connection name.
        name: String,
    },

    /// Illegal node state transition.
    #[error("invalid node transition from {from} to {to}")]
    InvalidTransition {
        /// State the node is currently in.
        from: NodeState,
        /// State the transition attempted to reach.
        to: NodeState,
    },
}

impl WorkflowError {
    /// Convenience constructor for [`WorkflowError::InvalidTransition`].
    #[must_use]
    pub fn invalid_transition(from: NodeState, to: NodeState) -> Self {
        Self::InvalidTransition { from, to }
    }
}
