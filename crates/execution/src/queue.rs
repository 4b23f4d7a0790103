//! Queue items: per-node FIFO work waiting to be claimed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sirocco_core::{EventId, NodeId, QueueItemId, WorkflowId};

/// One unit of routed work, waiting for its node to be claimed.
///
/// A queue item binds an event to a concrete consumer node. Items for the
/// same node are consumed oldest-first; claiming deletes the item and
/// materialises an execution in its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique item id.
    pub id: QueueItemId,
    /// Workflow the consumer node belongs to.
    pub workflow_id: WorkflowId,
    /// Node that will consume the event.
    pub node_id: NodeId,
    /// Event to consume.
    pub event_id: EventId,
    /// Root event at the origin of this chain.
    ///
    /// Propagated unchanged across routing hops so any execution can find
    /// the external payload that started it.
    pub root_event_id: EventId,
    /// Enqueue timestamp; the FIFO order key.
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    /// Creates a queue item for `node_id` consuming `event_id`.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        node_id: NodeId,
        event_id: EventId,
        root_event_id: EventId,
    ) -> Self {
        Self {
            id: QueueItemId::v4(),
            workflow_id,
            node_id,
            event_id,
            root_event_id,
            created_at: Utc::now(),
        }
    }
}
