//! The workflow container: nodes, edges, and connection groups.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sirocco_core::{NodeId, OrganizationId, WorkflowId};

use crate::edge::Edge;
use crate::error::WorkflowError;
use crate::group::{Connection, ConnectionGroup};
use crate::node::Node;

/// A directed graph of nodes owned by one organization.
///
/// The engine reads the definition and mutates only node states; everything
/// else is owned by whatever surface created the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier.
    pub id: WorkflowId,
    /// Owning organization; scopes secret lookups.
    pub organization_id: OrganizationId,
    /// Human-readable name.
    pub name: String,
    /// Graph vertices.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Channel-labelled fan-out.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Declarative fan-in joins.
    #[serde(default)]
    pub connection_groups: Vec<ConnectionGroup>,
}

impl Workflow {
    /// Create an empty workflow.
    #[must_use]
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::v4(),
            organization_id,
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            connection_groups: Vec::new(),
        }
    }

    /// Add a node.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge.
    #[must_use]
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Add a connection group.
    #[must_use]
    pub fn with_group(mut self, group: ConnectionGroup) -> Self {
        self.connection_groups.push(group);
        self
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Resolve a node by its human-readable name.
    ///
    /// Fails explicitly when the name is unknown or shared by more than one
    /// node — a name reference must never silently pick a winner.
    pub fn node_by_name(&self, name: &str) -> Result<&Node, WorkflowError> {
        let mut matches = self.nodes.iter().filter(|n| n.name == name);
        let first = matches
            .next()
            .ok_or_else(|| WorkflowError::UnknownNodeName(name.to_owned()))?;
        if matches.next().is_some() {
            return Err(WorkflowError::AmbiguousNodeName(name.to_owned()));
        }
        Ok(first)
    }

    /// All edges leaving `node` on `channel`.
    #[must_use]
    pub fn edges_from(&self, node: NodeId, channel: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.matches(node, channel)).collect()
    }

    /// Find the connection group (and connection) on `target` that is fed by
    /// `source`, if one exists.
    #[must_use]
    pub fn group_for(
        &self,
        target: NodeId,
        source: NodeId,
    ) -> Option<(&ConnectionGroup, &Connection)> {
        self.connection_groups
            .iter()
            .filter(|g| g.node_id == target)
            .find_map(|g| g.connection_for_source(source).map(|c| (g, c)))
    }

    /// Structural validation: non-empty name and nodes, unique node ids,
    /// edge/group references to known nodes, well-formed groups.
    ///
    /// Graph-shape checks (cycles, entry nodes) live on
    /// [`WorkflowGraph`](crate::graph::WorkflowGraph).
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::EmptyName);
        }
        if self.nodes.is_empty() {
            return Err(WorkflowError::NoNodes);
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(WorkflowError::DuplicateNodeId(node.id));
            }
        }

        for edge in &self.edges {
            if !seen.contains(&edge.source_node_id) {
                return Err(WorkflowError::UnknownNode(edge.source_node_id));
            }
            if !seen.contains(&edge.target_node_id) {
                return Err(WorkflowError::UnknownNode(edge.target_node_id));
            }
        }

        for group in &self.connection_groups {
            if !seen.contains(&group.node_id) {
                return Err(WorkflowError::UnknownNode(group.node_id));
            }
            if group.fields.is_empty() {
                return Err(WorkflowError::EmptyGroupFields(group.node_id));
            }
            if group.connections.is_empty() {
                return Err(WorkflowError::EmptyGroupConnections(group.node_id));
            }
            let mut names = HashSet::new();
            for conn in &group.connections {
                if !seen.contains(&conn.source_node_id) {
                    return Err(WorkflowError::UnknownNode(conn.source_node_id));
                }
                if !names.insert(conn.name.as_str()) {
                    return Err(WorkflowError::DuplicateConnectionName {
                        node_id: group.node_id,
                        name: conn.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
