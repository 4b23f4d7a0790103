//! Execution, event and queue records for the sirocco workflow engine.
//!
//! An [`Event`] is an addressed payload waiting on (or already past) routing.
//! Routing turns a pending event into [`QueueItem`]s, one per matching edge.
//! Claiming a queue item materialises an [`Execution`], the unit of work that
//! moves through `pending -> started -> finished` and settles on a
//! [`ExecutionResult`] plus [`ResultReason`]. Events heading into a fan-in
//! join accumulate on a [`FieldSet`] instead, until the group emits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod field_set;
mod queue;
mod record;
mod transition;

pub use error::ExecutionError;
pub use event::{Event, EventState};
pub use field_set::{FieldSet, FieldSetEvent, FieldSetState};
pub use queue::QueueItem;
pub use record::{Execution, ExecutionResult, ExecutionState, ResultReason};
pub use transition::validate_execution_transition;
