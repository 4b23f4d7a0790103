#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Store
//!
//! The persistence seam between the engine and whatever actually holds the
//! rows. The [`Store`] trait covers every read and write the engine makes:
//! workflow definitions, node states, events, queue items, executions, and
//! the field sets behind connection-group joins.
//!
//! Two operations are more than plain CRUD and carry atomicity contracts —
//! [`Store::claim`] (pop item + create execution + flip node, as one unit,
//! with skip-locked candidate selection) and [`Store::attach_field_set`]
//! (race-free find-or-create keyed on `(group, key hash)` over open sets).
//!
//! [`MemoryStore`] is the reference implementation: a single lock around
//! process-local maps, used by every test suite in the workspace and small
//! enough that the contracts above can be read straight from its source.

mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{Claim, Store};
