//! Channel-labelled edges between nodes.

use serde::{Deserialize, Serialize};
use sirocco_core::{EdgeId, NodeId};

/// Channel used when a node emits without naming one.
pub const DEFAULT_CHANNEL: &str = "main";

/// A directed edge carrying events from one node to another.
///
/// Edges define fan-out only; fan-in joins are declared separately as
/// connection groups. Read-only to the engine core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge identifier.
    pub id: EdgeId,
    /// Node producing events.
    pub source_node_id: NodeId,
    /// Node receiving events.
    pub target_node_id: NodeId,
    /// Output channel this edge listens on.
    pub channel: String,
}

impl Edge {
    /// Create an edge on the default channel.
    #[must_use]
    pub fn new(source_node_id: NodeId, target_node_id: NodeId) -> Self {
        Self {
            id: EdgeId::v4(),
            source_node_id,
            target_node_id,
            channel: DEFAULT_CHANNEL.to_owned(),
        }
    }

    /// Set the channel this edge listens on.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Returns `true` if this edge carries events emitted by `node` on `channel`.
    #[must_use]
    pub fn matches(&self, node: NodeId, channel: &str) -> bool {
        self.source_node_id == node && self.channel == channel
    }
}
