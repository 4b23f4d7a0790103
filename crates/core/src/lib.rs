#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Core
//!
//! Typed identifiers shared by every sirocco crate.
//!
//! Each entity of the orchestration engine (workflows, nodes, edges, events,
//! queue items, executions, connection groups, field sets, organizations)
//! gets its own UUID-backed id newtype, so an [`ExecutionId`] can never be
//! passed where a [`NodeId`] is expected.
//!
//! All id types are `Copy` (16 bytes, stack-allocated) and support:
//! - `v4()` for random generation
//! - `nil()` for the zero-valued default
//! - `parse(&str)` for string parsing
//! - Full serde support (serializes as the UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`

pub mod id;

pub use id::{
    ConnectionGroupId, EdgeId, EventId, ExecutionId, FieldSetId, IdParseError, NodeId,
    OrganizationId, QueueItemId, WorkflowId,
};
