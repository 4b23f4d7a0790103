#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Workflow
//!
//! Workflow definition for the sirocco orchestration engine.
//!
//! A workflow is a directed graph of nodes connected by channel-labelled
//! edges. Fan-in joins are declared as connection groups: named connections
//! feeding a consumer node, matched on extracted field values. This crate
//! defines:
//!
//! - [`Node`], [`NodeType`], [`NodeState`] — graph vertices and their state machine
//! - [`Edge`] — channel-labelled fan-out between nodes
//! - [`ConnectionGroup`], [`Connection`], [`GroupPolicy`] — fan-in join declarations
//! - [`Workflow`] — the container, with name lookup and structural validation
//! - [`WorkflowGraph`] (a `petgraph` wrapper) — topology queries for routing
//!
//! Definitions are read-only to the engine except for [`Node::state`], which
//! the queue/state machine mutates.

pub mod edge;
pub mod error;
pub mod graph;
pub mod group;
pub mod node;
pub mod workflow;

pub use edge::{DEFAULT_CHANNEL, Edge};
pub use error::WorkflowError;
pub use graph::WorkflowGraph;
pub use group::{Connection, ConnectionGroup, GroupPolicy, PolicyKind, TimeoutBehavior};
pub use node::{Node, NodeState, NodeType};
pub use workflow::Workflow;

/// Serde helper for `Duration` serialized as integer milliseconds.
pub(crate) mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize a `Duration` as an integer of milliseconds.
    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(s)
    }

    /// Deserialize an integer of milliseconds into a `Duration`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
