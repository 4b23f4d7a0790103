//! The persistence contract the engine runs against.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use sirocco_core::{ConnectionGroupId, EventId, ExecutionId, FieldSetId, NodeId, WorkflowId};
use sirocco_execution::{Event, Execution, FieldSet, FieldSetEvent, FieldSetState, QueueItem};
use sirocco_workflow::{Node, NodeState, Workflow};

use crate::error::StoreError;

/// The result of a successful [`Store::claim`]: the node has moved to
/// `processing` and an execution has materialised from its oldest queue item.
#[derive(Debug, Clone)]
pub struct Claim {
    /// The claimed node, already in `processing`.
    pub node: Node,
    /// The freshly created `pending` execution.
    pub execution: Execution,
}

/// Durable rows the engine reads and mutates.
///
/// Implementations must be shareable across worker tasks (`Send + Sync`).
/// Two operations carry transactional contracts a backend has to honor:
///
/// - [`claim`](Store::claim) is one atomic unit: pop the queue item, create
///   the execution, flip the node — all or nothing, with skip-locked
///   candidate selection so concurrent workers never block on each other or
///   hand the same node out twice.
/// - [`attach_field_set`](Store::attach_field_set) is a race-free upsert:
///   (group id, key hash) is unique among *open* sets, and concurrent first
///   arrivals for a key must land on a single row.
///
/// The in-memory implementation in this crate ([`MemoryStore`](crate::MemoryStore))
/// is the reference for both; a relational backend maps them to
/// `FOR UPDATE SKIP LOCKED` and a partial unique index with
/// `ON CONFLICT .. RETURNING`.
#[async_trait]
pub trait Store: Send + Sync {
    // ── workflows ────────────────────────────────────────────────────────

    /// Inserts or replaces a workflow definition (nodes, edges, groups).
    async fn put_workflow(&self, workflow: Workflow) -> Result<(), StoreError>;

    /// Loads a workflow definition.
    async fn workflow(&self, id: WorkflowId) -> Result<Workflow, StoreError>;

    /// All stored workflow definitions. The field-set sweeper walks this.
    async fn workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    // ── nodes ────────────────────────────────────────────────────────────

    /// Loads a node row.
    async fn node(&self, id: NodeId) -> Result<Node, StoreError>;

    /// Writes a node's lifecycle state.
    ///
    /// Pure write: transition legality is the caller's concern, so that the
    /// state machine owns the rules and the store owns the rows.
    async fn update_node_state(&self, id: NodeId, state: NodeState) -> Result<(), StoreError>;

    // ── events ───────────────────────────────────────────────────────────

    /// Inserts an event.
    async fn insert_event(&self, event: Event) -> Result<(), StoreError>;

    /// Loads an event.
    async fn event(&self, id: EventId) -> Result<Event, StoreError>;

    /// Up to `limit` events still awaiting routing, oldest first.
    async fn pending_events(&self, limit: usize) -> Result<Vec<Event>, StoreError>;

    /// Marks an event as fanned out by the router.
    async fn mark_event_routed(&self, id: EventId) -> Result<(), StoreError>;

    // ── queue ────────────────────────────────────────────────────────────

    /// Appends a queue item.
    async fn enqueue(&self, item: QueueItem) -> Result<(), StoreError>;

    /// All queued items for a node, oldest first.
    async fn queued_items(&self, node: NodeId) -> Result<Vec<QueueItem>, StoreError>;

    /// Claims the globally oldest queue item whose node is `ready`.
    ///
    /// Atomically: transitions the node to `processing`, deletes the item,
    /// and creates a `pending` execution that freezes the node's current
    /// configuration, copies the item's root event id, and links the
    /// execution that produced the consumed event (root events link none).
    /// Returns `None` when nothing is claimable — contention is not an error.
    async fn claim(&self) -> Result<Option<Claim>, StoreError>;

    // ── executions ───────────────────────────────────────────────────────

    /// Inserts an execution.
    ///
    /// [`claim`](Store::claim) creates executions itself; this exists for
    /// blueprint expansion surfaces and tests that build chains directly.
    async fn insert_execution(&self, execution: Execution) -> Result<(), StoreError>;

    /// Loads an execution.
    async fn execution(&self, id: ExecutionId) -> Result<Execution, StoreError>;

    /// Replaces an execution row.
    async fn update_execution(&self, execution: Execution) -> Result<(), StoreError>;

    /// All `started` executions of a node.
    async fn started_executions(&self, node: NodeId) -> Result<Vec<Execution>, StoreError>;

    /// All executions whose parent is `parent`, any state.
    async fn children_of(&self, parent: ExecutionId) -> Result<Vec<Execution>, StoreError>;

    /// Up to `limit` `started` executions carrying an async correlation id,
    /// oldest first. The poll scheduler feeds on this.
    async fn pollable_executions(&self, limit: usize) -> Result<Vec<Execution>, StoreError>;

    // ── field sets ───────────────────────────────────────────────────────

    /// Attaches an event to the open field set for `(group, key_hash)`,
    /// creating the set from `fields` on first sight.
    ///
    /// The find-or-create and the attach happen under one guard so that
    /// concurrent first arrivals converge on a single row. The attach itself
    /// is idempotent per connection name (first attachment wins). Returns
    /// the row after the attempt; callers judge emission on it.
    async fn attach_field_set(
        &self,
        group: ConnectionGroupId,
        key_hash: &str,
        fields: IndexMap<String, Value>,
        event: FieldSetEvent,
    ) -> Result<FieldSet, StoreError>;

    /// Loads a field set.
    async fn field_set(&self, id: FieldSetId) -> Result<FieldSet, StoreError>;

    /// All open field sets of a group, oldest first.
    async fn open_field_sets(&self, group: ConnectionGroupId) -> Result<Vec<FieldSet>, StoreError>;

    /// Compare-and-set close: `open -> emitted | errored`.
    ///
    /// Returns `true` only for the caller that actually closed the set, so
    /// exactly one of several racing emitters wins. Closing to `open` is
    /// rejected with [`StoreError::InvalidCloseState`].
    async fn close_field_set(
        &self,
        id: FieldSetId,
        state: FieldSetState,
    ) -> Result<bool, StoreError>;

    /// Deletes a field set if it is still open (the `drop` timeout
    /// behavior). Returns whether a row was removed.
    async fn delete_field_set(&self, id: FieldSetId) -> Result<bool, StoreError>;
}
