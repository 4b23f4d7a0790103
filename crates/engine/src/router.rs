//! Fan-out of pending events along workflow edges.
//!
//! Events belong to the node that produced them; routing reads the edges
//! leaving that node on the event's channel and enqueues work at each
//! target. A target fed through a connection group goes to the aggregator
//! instead of straight to the queue.

use std::sync::Arc;

use sirocco_execution::{Event, QueueItem};
use sirocco_join::{Aggregator, JoinError};
use sirocco_store::Store;

use crate::error::EngineError;

/// Drains pending events into queue items and field-set attachments.
///
/// Cheap to clone; clones share the store and aggregator.
pub struct Router<S> {
    store: Arc<S>,
    aggregator: Aggregator<S>,
}

impl<S> Clone for Router<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            aggregator: self.aggregator.clone(),
        }
    }
}

impl<S> Router<S> {
    /// Creates a router over `store`, delegating grouped targets to
    /// `aggregator`.
    pub fn new(store: Arc<S>, aggregator: Aggregator<S>) -> Self {
        Self { store, aggregator }
    }
}

impl<S: Store> Router<S> {
    /// Routes up to `limit` pending events, oldest first. Returns how many
    /// events were consumed.
    ///
    /// An event with no matching edges is still marked routed: a leaf node's
    /// output simply ends the chain. A key-extraction failure on a grouped
    /// target consumes the event too, since retrying it can never extract a
    /// different key; store failures abort the batch so the event stays
    /// pending for the next pass.
    pub async fn route_pending(&self, limit: usize) -> Result<usize, EngineError> {
        let events = self.store.pending_events(limit).await?;
        let routed = events.len();
        for event in events {
            self.route_event(&event).await?;
            self.store.mark_event_routed(event.id).await?;
        }
        Ok(routed)
    }

    async fn route_event(&self, event: &Event) -> Result<(), EngineError> {
        let node = self.store.node(event.node_id).await?;
        let workflow = self.store.workflow(node.workflow_id).await?;
        // A produced event inherits its execution's chain origin; a root
        // event is its own.
        let root_event_id = match event.execution_id {
            Some(id) => self.store.execution(id).await?.root_event_id,
            None => event.id,
        };

        let edges = workflow.edges_from(event.node_id, &event.channel);
        tracing::debug!(
            event = %event.id,
            node = %event.node_id,
            channel = %event.channel,
            targets = edges.len(),
            "routing event"
        );

        for edge in edges {
            let Some((group, connection)) =
                workflow.group_for(edge.target_node_id, event.node_id)
            else {
                let item =
                    QueueItem::new(workflow.id, edge.target_node_id, event.id, root_event_id);
                self.store.enqueue(item).await?;
                continue;
            };

            match self
                .aggregator
                .ingest(workflow.id, group, &connection.name, event, root_event_id)
                .await
            {
                Ok(Some(combined)) => {
                    tracing::debug!(
                        event = %event.id,
                        group = %group.id,
                        combined = %combined.id,
                        "ingestion completed a field set"
                    );
                }
                Ok(None) => {}
                Err(JoinError::Extraction { field, source }) => {
                    tracing::error!(
                        event = %event.id,
                        group = %group.id,
                        field = %field,
                        error = %source,
                        "key extraction failed; event not attached"
                    );
                }
                Err(err @ JoinError::Store(_)) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sirocco_core::{NodeId, OrganizationId};
    use sirocco_store::MemoryStore;
    use sirocco_workflow::{
        ConnectionGroup, DEFAULT_CHANNEL, Edge, GroupPolicy, Node, NodeType, Workflow,
    };
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        router: Router<MemoryStore>,
        trigger: NodeId,
        a: NodeId,
        b: NodeId,
    }

    /// `T -(main)-> A -(main)-> B`, plus `T -(error)-> B`.
    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let router = Router::new(Arc::clone(&store), Aggregator::new(Arc::clone(&store)));

        let mut workflow = Workflow::new(OrganizationId::v4(), "wf");
        let trigger = Node::new(workflow.id, "T", NodeType::Trigger, "webhook");
        let a = Node::new(workflow.id, "A", NodeType::Component, "noop");
        let b = Node::new(workflow.id, "B", NodeType::Component, "noop");
        let (t_id, a_id, b_id) = (trigger.id, a.id, b.id);
        workflow = workflow
            .with_node(trigger)
            .with_node(a)
            .with_node(b)
            .with_edge(Edge::new(t_id, a_id))
            .with_edge(Edge::new(a_id, b_id))
            .with_edge(Edge::new(t_id, b_id).with_channel("error"));
        store.put_workflow(workflow).await.unwrap();

        Fixture {
            store,
            router,
            trigger: t_id,
            a: a_id,
            b: b_id,
        }
    }

    #[tokio::test]
    async fn routes_only_matching_channels() {
        let f = fixture().await;
        let event = Event::root(f.trigger, DEFAULT_CHANNEL, json!({"n": 1}));
        f.store.insert_event(event.clone()).await.unwrap();

        let routed = f.router.route_pending(16).await.unwrap();
        assert_eq!(routed, 1);

        let at_a = f.store.queued_items(f.a).await.unwrap();
        assert_eq!(at_a.len(), 1);
        assert_eq!(at_a[0].event_id, event.id);
        assert_eq!(at_a[0].root_event_id, event.id);
        assert!(f.store.queued_items(f.b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn routed_events_are_not_routed_twice() {
        let f = fixture().await;
        let event = Event::root(f.trigger, DEFAULT_CHANNEL, json!({}));
        f.store.insert_event(event).await.unwrap();

        assert_eq!(f.router.route_pending(16).await.unwrap(), 1);
        assert_eq!(f.router.route_pending(16).await.unwrap(), 0);
        assert_eq!(f.store.queued_items(f.a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn produced_events_inherit_the_chain_root() {
        let f = fixture().await;
        let root = Event::root(f.trigger, DEFAULT_CHANNEL, json!({}));
        f.store.insert_event(root.clone()).await.unwrap();
        f.router.route_pending(16).await.unwrap();

        let claim = f.store.claim().await.unwrap().unwrap();
        let produced = Event::produced(
            f.a,
            DEFAULT_CHANNEL,
            json!({"out": true}),
            claim.execution.id,
        );
        f.store.insert_event(produced.clone()).await.unwrap();
        f.router.route_pending(16).await.unwrap();

        let at_b = f.store.queued_items(f.b).await.unwrap();
        assert_eq!(at_b.len(), 1);
        assert_eq!(at_b[0].event_id, produced.id);
        assert_eq!(at_b[0].root_event_id, root.id);
    }

    #[tokio::test]
    async fn leaf_output_is_consumed_without_targets() {
        let f = fixture().await;
        let orphan = Event::root(f.b, DEFAULT_CHANNEL, json!({}));
        f.store.insert_event(orphan).await.unwrap();

        let routed = f.router.route_pending(16).await.unwrap();
        assert_eq!(routed, 1);
        assert!(f.store.pending_events(16).await.unwrap().is_empty());
        assert!(f.store.queued_items(f.a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fan_out_reaches_every_target_on_the_channel() {
        let store = Arc::new(MemoryStore::new());
        let router = Router::new(Arc::clone(&store), Aggregator::new(Arc::clone(&store)));
        let mut workflow = Workflow::new(OrganizationId::v4(), "fan");
        let t = Node::new(workflow.id, "T", NodeType::Trigger, "webhook");
        let x = Node::new(workflow.id, "X", NodeType::Component, "noop");
        let y = Node::new(workflow.id, "Y", NodeType::Component, "noop");
        let (t_id, x_id, y_id) = (t.id, x.id, y.id);
        workflow = workflow
            .with_node(t)
            .with_node(x)
            .with_node(y)
            .with_edge(Edge::new(t_id, x_id))
            .with_edge(Edge::new(t_id, y_id));
        store.put_workflow(workflow).await.unwrap();

        let event = Event::root(t_id, DEFAULT_CHANNEL, json!({}));
        store.insert_event(event).await.unwrap();
        router.route_pending(16).await.unwrap();

        assert_eq!(store.queued_items(x_id).await.unwrap().len(), 1);
        assert_eq!(store.queued_items(y_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn grouped_targets_go_through_the_aggregator() {
        let store = Arc::new(MemoryStore::new());
        let router = Router::new(Arc::clone(&store), Aggregator::new(Arc::clone(&store)));
        let mut workflow = Workflow::new(OrganizationId::v4(), "join");
        let t1 = Node::new(workflow.id, "T1", NodeType::Trigger, "webhook");
        let t2 = Node::new(workflow.id, "T2", NodeType::Trigger, "webhook");
        let j = Node::new(workflow.id, "J", NodeType::Component, "merge");
        let (t1_id, t2_id, j_id) = (t1.id, t2.id, j.id);
        let group = ConnectionGroup::new(j_id, GroupPolicy::all(Duration::from_secs(60)))
            .with_field("version", "$.version")
            .with_connection("src1", t1_id)
            .with_connection("src2", t2_id);
        workflow = workflow
            .with_node(t1)
            .with_node(t2)
            .with_node(j)
            .with_edge(Edge::new(t1_id, j_id))
            .with_edge(Edge::new(t2_id, j_id))
            .with_group(group);
        store.put_workflow(workflow).await.unwrap();

        let first = Event::root(t1_id, DEFAULT_CHANNEL, json!({"version": "v1"}));
        store.insert_event(first).await.unwrap();
        router.route_pending(16).await.unwrap();
        // One attachment: nothing queued at the join node yet.
        assert!(store.queued_items(j_id).await.unwrap().is_empty());

        let second = Event::root(t2_id, DEFAULT_CHANNEL, json!({"version": "v1"}));
        store.insert_event(second).await.unwrap();
        router.route_pending(16).await.unwrap();

        let queued = store.queued_items(j_id).await.unwrap();
        assert_eq!(queued.len(), 1);
        let combined = store.event(queued[0].event_id).await.unwrap();
        assert_eq!(combined.payload["version"], json!("v1"));
    }

    #[tokio::test]
    async fn extraction_failure_consumes_the_event() {
        let store = Arc::new(MemoryStore::new());
        let router = Router::new(Arc::clone(&store), Aggregator::new(Arc::clone(&store)));
        let mut workflow = Workflow::new(OrganizationId::v4(), "join");
        let t1 = Node::new(workflow.id, "T1", NodeType::Trigger, "webhook");
        let j = Node::new(workflow.id, "J", NodeType::Component, "merge");
        let (t1_id, j_id) = (t1.id, j.id);
        let group = ConnectionGroup::new(j_id, GroupPolicy::all(Duration::from_secs(60)))
            .with_field("version", "$.version")
            .with_connection("src1", t1_id);
        let group_id = group.id;
        workflow = workflow
            .with_node(t1)
            .with_node(j)
            .with_edge(Edge::new(t1_id, j_id))
            .with_group(group);
        store.put_workflow(workflow).await.unwrap();

        let event = Event::root(t1_id, DEFAULT_CHANNEL, json!({"other": 1}));
        store.insert_event(event).await.unwrap();

        let routed = router.route_pending(16).await.unwrap();
        assert_eq!(routed, 1);
        assert!(store.pending_events(16).await.unwrap().is_empty());
        assert!(store.open_field_sets(group_id).await.unwrap().is_empty());
    }
}
