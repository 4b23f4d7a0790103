//! Topology queries over a workflow, built on `petgraph`.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use sirocco_core::NodeId;

use crate::edge::Edge;
use crate::error::WorkflowError;
use crate::workflow::Workflow;

/// A directed graph view of a workflow for routing and validation.
#[derive(Debug)]
pub struct WorkflowGraph {
    graph: DiGraph<NodeId, Edge>,
    index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Build a [`WorkflowGraph`] from a [`Workflow`].
    ///
    /// Returns an error if an edge references an unknown node or loops a node
    /// onto itself.
    pub fn from_workflow(workflow: &Workflow) -> Result<Self, WorkflowError> {
        let mut graph = DiGraph::new();
        let mut index_map = HashMap::new();

        for node in &workflow.nodes {
            let idx = graph.add_node(node.id);
            index_map.insert(node.id, idx);
        }

        for edge in &workflow.edges {
            let from_idx = index_map
                .get(&edge.source_node_id)
                .ok_or(WorkflowError::UnknownNode(edge.source_node_id))?;
            let to_idx = index_map
                .get(&edge.target_node_id)
                .ok_or(WorkflowError::UnknownNode(edge.target_node_id))?;
            if edge.source_node_id == edge.target_node_id {
                return Err(WorkflowError::SelfLoop(edge.source_node_id));
            }
            graph.add_edge(*from_idx, *to_idx, edge.clone());
        }

        Ok(Self { graph, index_map })
    }

    /// Returns `true` if the graph contains at least one cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// Topological sort of the graph. Returns an error if a cycle exists.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, WorkflowError> {
        let sorted = algo::toposort(&self.graph, None).map_err(|_| WorkflowError::CycleDetected)?;
        Ok(sorted.into_iter().map(|idx| self.graph[idx]).collect())
    }

    /// All edges leaving `id`.
    #[must_use]
    pub fn outgoing_edges(&self, id: NodeId) -> Vec<&Edge> {
        let Some(&idx) = self.index_map.get(&id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.weight())
            .collect()
    }

    /// All edges pointing at `id`.
    #[must_use]
    pub fn incoming_edges(&self, id: NodeId) -> Vec<&Edge> {
        let Some(&idx) = self.index_map.get(&id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.weight())
            .collect()
    }

    /// Nodes with no incoming edges (the graph's start points).
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
                    == 0
            })
            .map(|idx| self.graph[idx])
            .collect()
    }

    /// Upstream node ids of `id`.
    #[must_use]
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        if let Some(&idx) = self.index_map.get(&id) {
            self.graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|i| self.graph[i])
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Downstream node ids of `id`.
    #[must_use]
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        if let Some(&idx) = self.index_map.get(&id) {
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .map(|i| self.graph[i])
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Validate the graph shape: no cycles and at least one entry node.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.has_cycle() {
            return Err(WorkflowError::CycleDetected);
        }
        if self.graph.node_count() > 0 && self.entry_nodes().is_empty() {
            return Err(WorkflowError::NoEntryNodes);
        }
        Ok(())
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
