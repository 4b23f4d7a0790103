//! In-memory [`Store`]: the reference implementation and the test backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use sirocco_core::{ConnectionGroupId, EventId, ExecutionId, FieldSetId, NodeId, WorkflowId};
use sirocco_execution::{
    Event, EventState, Execution, ExecutionState, FieldSet, FieldSetEvent, FieldSetState,
    QueueItem,
};
use sirocco_workflow::{Node, NodeState, Workflow};

use crate::error::StoreError;
use crate::store::{Claim, Store};

#[derive(Debug, Default)]
struct Inner {
    workflows: HashMap<WorkflowId, Workflow>,
    events: HashMap<EventId, Event>,
    queue: Vec<QueueItem>,
    executions: HashMap<ExecutionId, Execution>,
    field_sets: HashMap<FieldSetId, FieldSet>,
}

impl Inner {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.workflows
            .values()
            .flat_map(|w| &w.nodes)
            .find(|n| n.id == id)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.workflows
            .values_mut()
            .flat_map(|w| &mut w.nodes)
            .find(|n| n.id == id)
    }
}

/// A [`Store`] backed by one process-local map set behind a single
/// `parking_lot::RwLock`.
///
/// Every mutating method takes the write lock for its whole body, so the
/// transactional contracts of [`claim`](Store::claim) and
/// [`attach_field_set`](Store::attach_field_set) hold trivially: no other
/// writer can observe a half-applied claim, and candidate rows are never
/// seen locked (which is exactly the skip-locked guarantee).
///
/// Cloning is cheap and shares the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queue items across all nodes. Test and metrics hook.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.read().queue.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        self.inner.write().workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn workflow(&self, id: WorkflowId) -> Result<Workflow, StoreError> {
        self.inner
            .read()
            .workflows
            .get(&id)
            .cloned()
            .ok_or(StoreError::WorkflowNotFound(id))
    }

    async fn workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let inner = self.inner.read();
        let mut all: Vec<Workflow> = inner.workflows.values().cloned().collect();
        all.sort_by_key(|w| w.id);
        Ok(all)
    }

    async fn node(&self, id: NodeId) -> Result<Node, StoreError> {
        self.inner
            .read()
            .node(id)
            .cloned()
            .ok_or(StoreError::NodeNotFound(id))
    }

    async fn update_node_state(&self, id: NodeId, state: NodeState) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let node = inner.node_mut(id).ok_or(StoreError::NodeNotFound(id))?;
        node.state = state;
        Ok(())
    }

    async fn insert_event(&self, event: Event) -> Result<(), StoreError> {
        self.inner.write().events.insert(event.id, event);
        Ok(())
    }

    async fn event(&self, id: EventId) -> Result<Event, StoreError> {
        self.inner
            .read()
            .events
            .get(&id)
            .cloned()
            .ok_or(StoreError::EventNotFound(id))
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.read();
        let mut pending: Vec<Event> = inner
            .events
            .values()
            .filter(|e| e.state == EventState::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_event_routed(&self, id: EventId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let event = inner
            .events
            .get_mut(&id)
            .ok_or(StoreError::EventNotFound(id))?;
        event.mark_routed();
        Ok(())
    }

    async fn enqueue(&self, item: QueueItem) -> Result<(), StoreError> {
        self.inner.write().queue.push(item);
        Ok(())
    }

    async fn queued_items(&self, node: NodeId) -> Result<Vec<QueueItem>, StoreError> {
        let inner = self.inner.read();
        let mut items: Vec<QueueItem> = inner
            .queue
            .iter()
            .filter(|i| i.node_id == node)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn claim(&self) -> Result<Option<Claim>, StoreError> {
        let mut inner = self.inner.write();

        // Visit items oldest first; take the first one whose node is ready.
        // Items for busy or paused nodes are skipped, not waited on.
        let mut order: Vec<usize> = (0..inner.queue.len()).collect();
        order.sort_by(|&a, &b| {
            let (x, y) = (&inner.queue[a], &inner.queue[b]);
            x.created_at.cmp(&y.created_at).then_with(|| x.id.cmp(&y.id))
        });
        let Some(idx) = order.into_iter().find(|&i| {
            let item = &inner.queue[i];
            inner.node(item.node_id).is_some_and(|n| n.state.is_claimable())
        }) else {
            return Ok(None);
        };

        let item = inner.queue[idx].clone();
        let previous = inner
            .events
            .get(&item.event_id)
            .and_then(|e| e.execution_id);
        let Some(node) = inner.node_mut(item.node_id) else {
            return Ok(None);
        };
        node.state = NodeState::Processing;
        let node = node.clone();
        inner.queue.remove(idx);

        let mut execution =
            Execution::new(item.workflow_id, item.node_id, item.event_id, item.root_event_id)
                .with_configuration(node.configuration.clone());
        if let Some(previous) = previous {
            execution = execution.with_previous_execution(previous);
        }
        inner.executions.insert(execution.id, execution.clone());

        Ok(Some(Claim { node, execution }))
    }

    async fn insert_execution(&self, execution: Execution) -> Result<(), StoreError> {
        self.inner.write().executions.insert(execution.id, execution);
        Ok(())
    }

    async fn execution(&self, id: ExecutionId) -> Result<Execution, StoreError> {
        self.inner
            .read()
            .executions
            .get(&id)
            .cloned()
            .ok_or(StoreError::ExecutionNotFound(id))
    }

    async fn update_execution(&self, execution: Execution) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if !inner.executions.contains_key(&execution.id) {
            return Err(StoreError::ExecutionNotFound(execution.id));
        }
        inner.executions.insert(execution.id, execution);
        Ok(())
    }

    async fn started_executions(&self, node: NodeId) -> Result<Vec<Execution>, StoreError> {
        let inner = self.inner.read();
        let mut started: Vec<Execution> = inner
            .executions
            .values()
            .filter(|e| e.node_id == node && e.state == ExecutionState::Started)
            .cloned()
            .collect();
        started.sort_by_key(|e| e.created_at);
        Ok(started)
    }

    async fn children_of(&self, parent: ExecutionId) -> Result<Vec<Execution>, StoreError> {
        let inner = self.inner.read();
        let mut children: Vec<Execution> = inner
            .executions
            .values()
            .filter(|e| e.parent_execution_id == Some(parent))
            .cloned()
            .collect();
        children.sort_by_key(|e| e.created_at);
        Ok(children)
    }

    async fn pollable_executions(&self, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let inner = self.inner.read();
        let mut pollable: Vec<Execution> = inner
            .executions
            .values()
            .filter(|e| e.state == ExecutionState::Started && e.async_id().is_some())
            .cloned()
            .collect();
        pollable.sort_by_key(|e| e.created_at);
        pollable.truncate(limit);
        Ok(pollable)
    }

    async fn attach_field_set(
        &self,
        group: ConnectionGroupId,
        key_hash: &str,
        fields: IndexMap<String, Value>,
        event: FieldSetEvent,
    ) -> Result<FieldSet, StoreError> {
        let mut inner = self.inner.write();

        // Uniqueness of (group, key) is scoped to open sets: a key seen
        // again after emission starts a fresh aggregation round.
        if let Some(set) = inner
            .field_sets
            .values_mut()
            .find(|s| s.group_id == group && s.key_hash == key_hash && s.is_open())
        {
            set.attach(event);
            return Ok(set.clone());
        }

        let mut set = FieldSet::new(group, key_hash, fields);
        set.attach(event);
        inner.field_sets.insert(set.id, set.clone());
        Ok(set)
    }

    async fn field_set(&self, id: FieldSetId) -> Result<FieldSet, StoreError> {
        self.inner
            .read()
            .field_sets
            .get(&id)
            .cloned()
            .ok_or(StoreError::FieldSetNotFound(id))
    }

    async fn open_field_sets(&self, group: ConnectionGroupId) -> Result<Vec<FieldSet>, StoreError> {
        let inner = self.inner.read();
        let mut open: Vec<FieldSet> = inner
            .field_sets
            .values()
            .filter(|s| s.group_id == group && s.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(open)
    }

    async fn close_field_set(
        &self,
        id: FieldSetId,
        state: FieldSetState,
    ) -> Result<bool, StoreError> {
        if state == FieldSetState::Open {
            return Err(StoreError::InvalidCloseState(state));
        }
        let mut inner = self.inner.write();
        let set = inner
            .field_sets
            .get_mut(&id)
            .ok_or(StoreError::FieldSetNotFound(id))?;
        if !set.is_open() {
            return Ok(false);
        }
        set.state = state;
        Ok(true)
    }

    async fn delete_field_set(&self, id: FieldSetId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let open = inner.field_sets.get(&id).is_some_and(FieldSet::is_open);
        if open {
            inner.field_sets.remove(&id);
        }
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sirocco_core::OrganizationId;
    use sirocco_workflow::NodeType;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    fn node(workflow_id: WorkflowId, name: &str) -> Node {
        Node::new(workflow_id, name, NodeType::Component, "noop")
    }

    /// One workflow with nodes `A` and `B`, no edges. Returns (store, a, b).
    async fn seeded() -> (MemoryStore, NodeId, NodeId) {
        let store = store();
        let mut wf = Workflow::new(OrganizationId::v4(), "wf");
        let a = node(wf.id, "A");
        let b = node(wf.id, "B");
        let (a_id, b_id) = (a.id, b.id);
        wf = wf.with_node(a).with_node(b);
        store.put_workflow(wf).await.unwrap();
        (store, a_id, b_id)
    }

    fn attachment(connection: &str) -> FieldSetEvent {
        FieldSetEvent::new(connection, EventId::v4(), json!({"v": 1}), EventId::v4())
    }

    #[tokio::test]
    async fn workflow_roundtrip_and_missing() {
        let store = store();
        let wf = Workflow::new(OrganizationId::v4(), "wf");
        let id = wf.id;
        store.put_workflow(wf).await.unwrap();

        assert_eq!(store.workflow(id).await.unwrap().name, "wf");
        assert!(matches!(
            store.workflow(WorkflowId::v4()).await,
            Err(StoreError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn workflows_lists_every_definition() {
        let store = store();
        assert!(store.workflows().await.unwrap().is_empty());

        store
            .put_workflow(Workflow::new(OrganizationId::v4(), "one"))
            .await
            .unwrap();
        store
            .put_workflow(Workflow::new(OrganizationId::v4(), "two"))
            .await
            .unwrap();

        assert_eq!(store.workflows().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn node_lookup_spans_workflows() {
        let (store, a, _) = seeded().await;
        let mut other = Workflow::new(OrganizationId::v4(), "other");
        let c = node(other.id, "C");
        let c_id = c.id;
        other = other.with_node(c);
        store.put_workflow(other).await.unwrap();

        assert_eq!(store.node(a).await.unwrap().name, "A");
        assert_eq!(store.node(c_id).await.unwrap().name, "C");
        assert!(matches!(
            store.node(NodeId::v4()).await,
            Err(StoreError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_node_state_persists() {
        let (store, a, _) = seeded().await;
        store.update_node_state(a, NodeState::Paused).await.unwrap();

        assert_eq!(store.node(a).await.unwrap().state, NodeState::Paused);
    }

    #[tokio::test]
    async fn pending_events_come_back_oldest_first() {
        let (store, a, _) = seeded().await;
        let first = Event::root(a, "main", json!(1));
        let second = Event::root(a, "main", json!(2));
        store.insert_event(second.clone()).await.unwrap();
        store.insert_event(first.clone()).await.unwrap();

        let pending = store.pending_events(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].created_at <= pending[1].created_at);

        store.mark_event_routed(first.id).await.unwrap();
        let pending = store.pending_events(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }

    #[tokio::test]
    async fn pending_events_respects_limit() {
        let (store, a, _) = seeded().await;
        for n in 0..5 {
            store.insert_event(Event::root(a, "main", json!(n))).await.unwrap();
        }

        assert_eq!(store.pending_events(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn claim_on_empty_queue_is_none() {
        let (store, _, _) = seeded().await;
        assert!(store.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_pops_item_and_opens_execution() {
        let (store, a, _) = seeded().await;
        let root = Event::root(a, "main", json!({"user": "john"}));
        let wf_id = store.node(a).await.unwrap().workflow_id;
        store.insert_event(root.clone()).await.unwrap();
        store
            .enqueue(QueueItem::new(wf_id, a, root.id, root.id))
            .await
            .unwrap();

        let claim = store.claim().await.unwrap().unwrap();

        assert_eq!(claim.node.id, a);
        assert_eq!(claim.node.state, NodeState::Processing);
        assert_eq!(claim.execution.state, ExecutionState::Pending);
        assert_eq!(claim.execution.event_id, root.id);
        assert_eq!(claim.execution.root_event_id, root.id);
        assert_eq!(claim.execution.previous_execution_id, None);
        assert_eq!(store.queue_len(), 0);
        assert_eq!(store.node(a).await.unwrap().state, NodeState::Processing);
        // The execution row is queryable immediately.
        let row = store.execution(claim.execution.id).await.unwrap();
        assert_eq!(row.node_id, a);
    }

    #[tokio::test]
    async fn claim_links_producing_execution() {
        let (store, a, b) = seeded().await;
        let wf_id = store.node(a).await.unwrap().workflow_id;
        let producer = Execution::new(wf_id, a, EventId::v4(), EventId::v4());
        let producer_id = producer.id;
        store.insert_execution(producer).await.unwrap();

        let produced = Event::produced(a, "main", json!({}), producer_id);
        store.insert_event(produced.clone()).await.unwrap();
        store
            .enqueue(QueueItem::new(wf_id, b, produced.id, EventId::v4()))
            .await
            .unwrap();

        let claim = store.claim().await.unwrap().unwrap();
        assert_eq!(claim.execution.previous_execution_id, Some(producer_id));
    }

    #[tokio::test]
    async fn claim_freezes_node_configuration() {
        let store = store();
        let mut wf = Workflow::new(OrganizationId::v4(), "wf");
        let a = node(wf.id, "A").with_configuration(json!({"url": "{{ $.T.url }}"}));
        let a_id = a.id;
        let wf_id = wf.id;
        wf = wf.with_node(a);
        store.put_workflow(wf).await.unwrap();

        let event = Event::root(a_id, "main", json!({}));
        store.insert_event(event.clone()).await.unwrap();
        store
            .enqueue(QueueItem::new(wf_id, a_id, event.id, event.id))
            .await
            .unwrap();

        let claim = store.claim().await.unwrap().unwrap();
        assert_eq!(claim.execution.configuration, json!({"url": "{{ $.T.url }}"}));
    }

    #[tokio::test]
    async fn claim_is_fifo_per_node() {
        let (store, a, _) = seeded().await;
        let wf_id = store.node(a).await.unwrap().workflow_id;
        let mut event_ids = Vec::new();
        for n in 0..3 {
            let event = Event::root(a, "main", json!(n));
            event_ids.push(event.id);
            store.insert_event(event.clone()).await.unwrap();
            store
                .enqueue(QueueItem::new(wf_id, a, event.id, event.id))
                .await
                .unwrap();
        }

        for expected in event_ids {
            let claim = store.claim().await.unwrap().unwrap();
            assert_eq!(claim.execution.event_id, expected);
            // Release the node for the next round.
            store.update_node_state(a, NodeState::Ready).await.unwrap();
        }
        assert!(store.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_skips_busy_node_and_takes_next() {
        let (store, a, b) = seeded().await;
        let wf_id = store.node(a).await.unwrap().workflow_id;
        let for_a = Event::root(a, "main", json!(1));
        let for_b = Event::root(b, "main", json!(2));
        store.insert_event(for_a.clone()).await.unwrap();
        store.insert_event(for_b.clone()).await.unwrap();
        store
            .enqueue(QueueItem::new(wf_id, a, for_a.id, for_a.id))
            .await
            .unwrap();
        store
            .enqueue(QueueItem::new(wf_id, b, for_b.id, for_b.id))
            .await
            .unwrap();
        store.update_node_state(a, NodeState::Processing).await.unwrap();

        let claim = store.claim().await.unwrap().unwrap();
        assert_eq!(claim.node.id, b);
        // A's item is still queued for when it frees up.
        assert_eq!(store.queued_items(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_never_double_books_a_node() {
        let (store, a, _) = seeded().await;
        let wf_id = store.node(a).await.unwrap().workflow_id;
        for n in 0..2 {
            let event = Event::root(a, "main", json!(n));
            store.insert_event(event.clone()).await.unwrap();
            store
                .enqueue(QueueItem::new(wf_id, a, event.id, event.id))
                .await
                .unwrap();
        }

        assert!(store.claim().await.unwrap().is_some());
        assert!(store.claim().await.unwrap().is_none());
        assert_eq!(store.queue_len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_hand_out_disjoint_work() {
        let store = store();
        let mut wf = Workflow::new(OrganizationId::v4(), "wf");
        let wf_id = wf.id;
        let mut node_ids = Vec::new();
        for n in 0..8 {
            let node = node(wf_id, &format!("n{n}"));
            node_ids.push(node.id);
            wf = wf.with_node(node);
        }
        store.put_workflow(wf).await.unwrap();
        for id in &node_ids {
            let event = Event::root(*id, "main", json!({}));
            store.insert_event(event.clone()).await.unwrap();
            store
                .enqueue(QueueItem::new(wf_id, *id, event.id, event.id))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim().await.unwrap() }));
        }
        let mut claimed_nodes = Vec::new();
        for handle in handles {
            if let Some(claim) = handle.await.unwrap() {
                claimed_nodes.push(claim.node.id);
            }
        }

        claimed_nodes.sort();
        let before = claimed_nodes.len();
        claimed_nodes.dedup();
        assert_eq!(before, claimed_nodes.len(), "a node was claimed twice");
        assert_eq!(before, 8);
    }

    #[tokio::test]
    async fn update_execution_requires_existing_row() {
        let (store, a, _) = seeded().await;
        let wf_id = store.node(a).await.unwrap().workflow_id;
        let execution = Execution::new(wf_id, a, EventId::v4(), EventId::v4());

        assert!(matches!(
            store.update_execution(execution.clone()).await,
            Err(StoreError::ExecutionNotFound(_))
        ));

        store.insert_execution(execution.clone()).await.unwrap();
        let mut updated = execution;
        updated.start().unwrap();
        store.update_execution(updated.clone()).await.unwrap();

        assert_eq!(
            store.execution(updated.id).await.unwrap().state,
            ExecutionState::Started
        );
    }

    #[tokio::test]
    async fn started_and_pollable_executions() {
        let (store, a, _) = seeded().await;
        let wf_id = store.node(a).await.unwrap().workflow_id;

        let mut started = Execution::new(wf_id, a, EventId::v4(), EventId::v4());
        started.start().unwrap();
        let mut polling = Execution::new(wf_id, a, EventId::v4(), EventId::v4());
        polling.start().unwrap();
        polling.set_async_id("job-1");
        let pending = Execution::new(wf_id, a, EventId::v4(), EventId::v4());

        store.insert_execution(started.clone()).await.unwrap();
        store.insert_execution(polling.clone()).await.unwrap();
        store.insert_execution(pending).await.unwrap();

        assert_eq!(store.started_executions(a).await.unwrap().len(), 2);
        let pollable = store.pollable_executions(10).await.unwrap();
        assert_eq!(pollable.len(), 1);
        assert_eq!(pollable[0].id, polling.id);
    }

    #[tokio::test]
    async fn children_of_filters_by_parent() {
        let (store, a, b) = seeded().await;
        let wf_id = store.node(a).await.unwrap().workflow_id;
        let parent = Execution::new(wf_id, a, EventId::v4(), EventId::v4());
        let child = Execution::new(wf_id, b, EventId::v4(), EventId::v4())
            .with_parent_execution(parent.id);
        let stranger = Execution::new(wf_id, b, EventId::v4(), EventId::v4());
        let parent_id = parent.id;
        let child_id = child.id;

        store.insert_execution(parent).await.unwrap();
        store.insert_execution(child).await.unwrap();
        store.insert_execution(stranger).await.unwrap();

        let children = store.children_of(parent_id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child_id);
    }

    #[tokio::test]
    async fn attach_field_set_creates_then_reuses_open_row() {
        let store = store();
        let group = ConnectionGroupId::v4();
        let mut fields = IndexMap::new();
        fields.insert("version".to_owned(), json!("v1"));

        let first = store
            .attach_field_set(group, "h1", fields.clone(), attachment("src1"))
            .await
            .unwrap();
        let second = store
            .attach_field_set(group, "h1", fields, attachment("src2"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.attached_count(), 2);
        assert_eq!(store.open_field_sets(group).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn attach_field_set_is_idempotent_per_connection() {
        let store = store();
        let group = ConnectionGroupId::v4();
        let first = attachment("src1");
        let first_event = first.event_id;

        store
            .attach_field_set(group, "h1", IndexMap::new(), first)
            .await
            .unwrap();
        let set = store
            .attach_field_set(group, "h1", IndexMap::new(), attachment("src1"))
            .await
            .unwrap();

        assert_eq!(set.attached_count(), 1);
        assert_eq!(set.attachment("src1").unwrap().event_id, first_event);
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_rows() {
        let store = store();
        let group = ConnectionGroupId::v4();

        let one = store
            .attach_field_set(group, "h1", IndexMap::new(), attachment("src1"))
            .await
            .unwrap();
        let two = store
            .attach_field_set(group, "h2", IndexMap::new(), attachment("src1"))
            .await
            .unwrap();

        assert_ne!(one.id, two.id);
        assert_eq!(store.open_field_sets(group).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn closed_key_starts_a_fresh_round() {
        let store = store();
        let group = ConnectionGroupId::v4();
        let first = store
            .attach_field_set(group, "h1", IndexMap::new(), attachment("src1"))
            .await
            .unwrap();
        assert!(store
            .close_field_set(first.id, FieldSetState::Emitted)
            .await
            .unwrap());

        let second = store
            .attach_field_set(group, "h1", IndexMap::new(), attachment("src2"))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.attached_count(), 1);
        assert!(second.is_open());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_arrivals_share_one_row() {
        let store = store();
        let group = ConnectionGroupId::v4();

        let mut handles = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .attach_field_set(group, "h1", IndexMap::new(), attachment(&format!("c{n}")))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let open = store.open_field_sets(group).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].attached_count(), 16);
    }

    #[tokio::test]
    async fn close_field_set_has_exactly_one_winner() {
        let store = store();
        let group = ConnectionGroupId::v4();
        let set = store
            .attach_field_set(group, "h1", IndexMap::new(), attachment("src1"))
            .await
            .unwrap();

        assert!(store
            .close_field_set(set.id, FieldSetState::Emitted)
            .await
            .unwrap());
        assert!(!store
            .close_field_set(set.id, FieldSetState::Errored)
            .await
            .unwrap());
        assert_eq!(
            store.field_set(set.id).await.unwrap().state,
            FieldSetState::Emitted
        );
    }

    #[tokio::test]
    async fn close_to_open_is_rejected() {
        let store = store();
        let set = store
            .attach_field_set(ConnectionGroupId::v4(), "h", IndexMap::new(), attachment("c"))
            .await
            .unwrap();

        assert!(matches!(
            store.close_field_set(set.id, FieldSetState::Open).await,
            Err(StoreError::InvalidCloseState(FieldSetState::Open))
        ));
    }

    #[tokio::test]
    async fn delete_field_set_only_removes_open_rows() {
        let store = store();
        let group = ConnectionGroupId::v4();
        let set = store
            .attach_field_set(group, "h1", IndexMap::new(), attachment("src1"))
            .await
            .unwrap();

        assert!(store.delete_field_set(set.id).await.unwrap());
        assert!(!store.delete_field_set(set.id).await.unwrap());

        let closed = store
            .attach_field_set(group, "h2", IndexMap::new(), attachment("src1"))
            .await
            .unwrap();
        store
            .close_field_set(closed.id, FieldSetState::Errored)
            .await
            .unwrap();
        assert!(!store.delete_field_set(closed.id).await.unwrap());
        // The errored row survives for inspection.
        assert!(store.field_set(closed.id).await.is_ok());
    }
}
