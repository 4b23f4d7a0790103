//! Connection groups: declarative fan-in joins.
//!
//! A connection group belongs to a consumer node. Each named connection
//! feeds it from one upstream node; inbound events are matched on the values
//! of the group's extraction expressions, and a combined event is emitted
//! once the policy is satisfied or the timeout elapses.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sirocco_core::{ConnectionGroupId, NodeId};

/// One named input feeding a connection group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Name under which attached events appear in the emitted payload.
    pub name: String,
    /// Node whose events feed this connection.
    pub source_node_id: NodeId,
}

impl Connection {
    /// Create a named connection.
    #[must_use]
    pub fn new(name: impl Into<String>, source_node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            source_node_id,
        }
    }
}

/// When a group is allowed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Every connection must have at least one attached event.
    All,
    /// Strictly more than half of the connections must have attached.
    Majority,
}

impl PolicyKind {
    /// Returns `true` once `attached` distinct connections (out of
    /// `required`) satisfy this policy.
    #[must_use]
    pub const fn satisfied(self, attached: usize, required: usize) -> bool {
        match self {
            Self::All => attached == required,
            // Integer form of "strictly more than half".
            Self::Majority => attached * 2 > required,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "all",
            Self::Majority => "majority",
        };
        f.write_str(s)
    }
}

/// What happens to a field set that is still open when its deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutBehavior {
    /// Mark the set errored.
    Fail,
    /// Discard the set silently.
    Drop,
    /// Emit immediately with whatever connections arrived.
    EmitPartial,
}

impl fmt::Display for TimeoutBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fail => "fail",
            Self::Drop => "drop",
            Self::EmitPartial => "emit_partial",
        };
        f.write_str(s)
    }
}

/// Emission policy of a connection group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPolicy {
    /// When the group may emit.
    pub kind: PolicyKind,
    /// How long a field set may stay open.
    #[serde(with = "crate::serde_duration")]
    pub timeout: Duration,
    /// What to do with a set that is still open past the timeout.
    pub timeout_behavior: TimeoutBehavior,
}

impl GroupPolicy {
    /// Policy requiring every connection, failing overdue sets.
    #[must_use]
    pub fn all(timeout: Duration) -> Self {
        Self {
            kind: PolicyKind::All,
            timeout,
            timeout_behavior: TimeoutBehavior::Fail,
        }
    }

    /// Policy requiring a strict majority of connections, failing overdue sets.
    #[must_use]
    pub fn majority(timeout: Duration) -> Self {
        Self {
            kind: PolicyKind::Majority,
            timeout,
            timeout_behavior: TimeoutBehavior::Fail,
        }
    }

    /// Override the timeout behavior.
    #[must_use]
    pub fn with_timeout_behavior(mut self, behavior: TimeoutBehavior) -> Self {
        self.timeout_behavior = behavior;
        self
    }
}

/// A declarative fan-in join feeding one consumer node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionGroup {
    /// Unique group identifier.
    pub id: ConnectionGroupId,
    /// The consumer node that receives the combined event.
    pub node_id: NodeId,
    /// Ordered field name → extraction expression map; evaluated against each
    /// inbound event's payload to compute the join key.
    pub fields: IndexMap<String, String>,
    /// When and how the group emits.
    pub policy: GroupPolicy,
    /// The named inputs feeding this group.
    pub connections: Vec<Connection>,
}

impl ConnectionGroup {
    /// Create a group with no fields or connections yet.
    #[must_use]
    pub fn new(node_id: NodeId, policy: GroupPolicy) -> Self {
        Self {
            id: ConnectionGroupId::v4(),
            node_id,
            fields: IndexMap::new(),
            policy,
            connections: Vec::new(),
        }
    }

    /// Add a grouping field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.fields.insert(name.into(), expression.into());
        self
    }

    /// Add a named connection.
    #[must_use]
    pub fn with_connection(mut self, name: impl Into<String>, source_node_id: NodeId) -> Self {
        self.connections.push(Connection::new(name, source_node_id));
        self
    }

    /// Number of connections the policy counts against.
    #[must_use]
    pub fn required_connections(&self) -> usize {
        self.connections.len()
    }

    /// All connection names, in declaration order.
    #[must_use]
    pub fn connection_names(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up the connection fed by `source`, if any.
    #[must_use]
    pub fn connection_for_source(&self, source: NodeId) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.source_node_id == source)
    }
}
