//! The queue and node state machine.
//!
//! Transition legality lives on the records themselves (`sirocco-execution`,
//! `sirocco-workflow`); this module is the part that applies transitions
//! through the store and carries their side effects: produced events, node
//! release, failure cascades, cancellation trees, and failure signals.

use std::sync::Arc;

use serde_json::Value;
use sirocco_core::{ExecutionId, NodeId};
use sirocco_execution::{Event, Execution, ResultReason};
use sirocco_store::{Claim, Store};
use sirocco_workflow::{NodeState, node::validate_node_transition};

use crate::error::EngineError;
use crate::notify::Notifier;

/// Applies execution and node lifecycle transitions against a store.
///
/// Cheap to clone; clones share the store and notifier.
pub struct StateMachine<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S> Clone for StateMachine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S> StateMachine<S> {
    /// Creates a state machine over `store`, signalling failures to
    /// `notifier`.
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }
}

impl<S: Store> StateMachine<S> {
    /// Claims the next unit of work, if any node is ready for one.
    pub async fn claim(&self) -> Result<Option<Claim>, EngineError> {
        let claim = self.store.claim().await?;
        if let Some(claim) = &claim {
            tracing::debug!(
                execution = %claim.execution.id,
                node = %claim.node.id,
                event = %claim.execution.event_id,
                "claimed node"
            );
        }
        Ok(claim)
    }

    /// Moves a pending execution to `started` and persists it.
    pub async fn start(&self, execution: &mut Execution) -> Result<(), EngineError> {
        execution.start()?;
        self.store.update_execution(execution.clone()).await?;
        Ok(())
    }

    /// Settles an execution as passed, creating one produced event per
    /// `(channel, payload)` output, and releases its node.
    pub async fn pass(
        &self,
        execution: &mut Execution,
        outputs: Vec<(String, Value)>,
    ) -> Result<(), EngineError> {
        execution.pass()?;
        self.store.update_execution(execution.clone()).await?;
        let produced = outputs.len();
        for (channel, payload) in outputs {
            let event = Event::produced(execution.node_id, channel, payload, execution.id);
            self.store.insert_event(event).await?;
        }
        self.release_node(execution.node_id).await?;
        tracing::info!(
            execution = %execution.id,
            node = %execution.node_id,
            produced,
            "execution passed"
        );
        Ok(())
    }

    /// Settles an execution as failed, releases its node, raises a failure
    /// signal, and cascades the failure up the parent chain.
    ///
    /// Each still-active ancestor fails with the same reason and message and
    /// raises its own signal; a settled ancestor stops the climb. Success
    /// never cascades: a parent passes only through its own [`pass`].
    ///
    /// [`pass`]: StateMachine::pass
    pub async fn fail(
        &self,
        execution: &mut Execution,
        reason: ResultReason,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        self.fail_one(execution, reason, message.clone()).await?;
        let mut parent_id = execution.parent_execution_id;
        while let Some(id) = parent_id {
            let mut parent = self.store.execution(id).await?;
            if parent.is_terminal() {
                break;
            }
            self.fail_one(&mut parent, reason, message.clone()).await?;
            parent_id = parent.parent_execution_id;
        }
        Ok(())
    }

    /// Cancels a root execution and every still-active descendant.
    ///
    /// Only roots may be cancelled: asking for a nested execution is
    /// rejected with [`EngineError::ChildCancellation`]. Descendants already
    /// settled are left untouched. `cancelled_by` lands in each cancelled
    /// execution's metadata.
    pub async fn cancel(
        &self,
        id: ExecutionId,
        cancelled_by: &str,
    ) -> Result<(), EngineError> {
        let mut root = self.store.execution(id).await?;
        if root.parent_execution_id.is_some() {
            return Err(EngineError::ChildCancellation(id));
        }
        self.cancel_one(&mut root, cancelled_by).await?;

        let mut stack = vec![root.id];
        while let Some(parent) = stack.pop() {
            for mut child in self.store.children_of(parent).await? {
                stack.push(child.id);
                if child.is_terminal() {
                    continue;
                }
                self.cancel_one(&mut child, cancelled_by).await?;
            }
        }
        Ok(())
    }

    /// Excludes a node from claiming until an explicit [`resume`].
    ///
    /// An in-flight execution runs to completion; pausing only suppresses
    /// the node's return to `ready` when it settles.
    ///
    /// [`resume`]: StateMachine::resume
    pub async fn pause(&self, node_id: NodeId) -> Result<(), EngineError> {
        let node = self.store.node(node_id).await?;
        validate_node_transition(node.state, NodeState::Paused)?;
        self.store.update_node_state(node_id, NodeState::Paused).await?;
        tracing::info!(node = %node_id, "node paused");
        Ok(())
    }

    /// Reopens a paused node: `processing` if it still has started
    /// executions, `ready` otherwise.
    pub async fn resume(&self, node_id: NodeId) -> Result<(), EngineError> {
        let node = self.store.node(node_id).await?;
        let started = self.store.started_executions(node_id).await?;
        let target = if started.is_empty() {
            NodeState::Ready
        } else {
            NodeState::Processing
        };
        validate_node_transition(node.state, target)?;
        self.store.update_node_state(node_id, target).await?;
        tracing::info!(node = %node_id, state = %target, "node resumed");
        Ok(())
    }

    /// Acknowledges a failed execution: `error` becomes `error_resolved`.
    /// Returns the updated row.
    pub async fn resolve_error(&self, id: ExecutionId) -> Result<Execution, EngineError> {
        let mut execution = self.store.execution(id).await?;
        execution.resolve_error()?;
        self.store.update_execution(execution.clone()).await?;
        tracing::info!(execution = %id, "execution error resolved");
        Ok(execution)
    }

    async fn fail_one(
        &self,
        execution: &mut Execution,
        reason: ResultReason,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        execution.fail(reason, message)?;
        self.store.update_execution(execution.clone()).await?;
        self.release_node(execution.node_id).await?;
        let node = self.store.node(execution.node_id).await?;
        self.notifier.execution_failed(execution, &node);
        tracing::warn!(
            execution = %execution.id,
            node = %execution.node_id,
            reason = %reason,
            message = execution.failure_message.as_deref().unwrap_or(""),
            "execution failed"
        );
        Ok(())
    }

    async fn cancel_one(
        &self,
        execution: &mut Execution,
        cancelled_by: &str,
    ) -> Result<(), EngineError> {
        execution.cancel(cancelled_by)?;
        self.store.update_execution(execution.clone()).await?;
        self.release_node(execution.node_id).await?;
        tracing::info!(
            execution = %execution.id,
            node = %execution.node_id,
            cancelled_by,
            "execution cancelled"
        );
        Ok(())
    }

    /// Returns a node to `ready` after its execution settled. Only
    /// `processing` flips: `paused` stays paused (that is the whole point of
    /// pausing) and quarantined nodes stay in `error`.
    async fn release_node(&self, node_id: NodeId) -> Result<(), EngineError> {
        let node = self.store.node(node_id).await?;
        if node.state == NodeState::Processing {
            self.store.update_node_state(node_id, NodeState::Ready).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sirocco_core::{EventId, OrganizationId, WorkflowId};
    use sirocco_execution::{EventState, ExecutionResult, QueueItem};
    use sirocco_store::MemoryStore;
    use sirocco_workflow::{Node, NodeType, Workflow};

    #[derive(Default)]
    struct RecordingNotifier {
        failed: Mutex<Vec<ExecutionId>>,
    }

    impl Notifier for RecordingNotifier {
        fn execution_failed(&self, execution: &Execution, _node: &Node) {
            self.failed.lock().push(execution.id);
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        machine: StateMachine<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        workflow_id: WorkflowId,
        node_a: NodeId,
        node_b: NodeId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let machine = StateMachine::new(Arc::clone(&store), notifier.clone() as _);

        let mut wf = Workflow::new(OrganizationId::v4(), "wf");
        let a = Node::new(wf.id, "A", NodeType::Component, "noop");
        let b = Node::new(wf.id, "B", NodeType::Component, "noop");
        let (node_a, node_b) = (a.id, b.id);
        let workflow_id = wf.id;
        wf = wf.with_node(a).with_node(b);
        store.put_workflow(wf).await.unwrap();

        Fixture {
            store,
            machine,
            notifier,
            workflow_id,
            node_a,
            node_b,
        }
    }

    /// Claims a real execution for `node` by enqueueing a root event,
    /// mirroring the router's sequence: enqueue, then mark the event routed.
    async fn claimed(f: &Fixture, node: NodeId) -> Execution {
        let event = Event::root(node, "main", json!({}));
        f.store.insert_event(event.clone()).await.unwrap();
        f.store
            .enqueue(QueueItem::new(f.workflow_id, node, event.id, event.id))
            .await
            .unwrap();
        f.store.mark_event_routed(event.id).await.unwrap();
        f.machine.claim().await.unwrap().unwrap().execution
    }

    #[tokio::test]
    async fn pass_creates_events_and_releases_the_node() {
        let f = fixture().await;
        let mut execution = claimed(&f, f.node_a).await;
        f.machine.start(&mut execution).await.unwrap();

        f.machine
            .pass(
                &mut execution,
                vec![
                    ("main".into(), json!({"user": "john"})),
                    ("audit".into(), json!({"ok": true})),
                ],
            )
            .await
            .unwrap();

        let row = f.store.execution(execution.id).await.unwrap();
        assert!(row.is_passed());
        assert_eq!(f.store.node(f.node_a).await.unwrap().state, NodeState::Ready);

        let pending = f.store.pending_events(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        for event in &pending {
            assert_eq!(event.execution_id, Some(execution.id));
            assert_eq!(event.node_id, f.node_a);
            assert_eq!(event.state, EventState::Pending);
        }
    }

    #[tokio::test]
    async fn pass_leaves_a_paused_node_paused() {
        let f = fixture().await;
        let mut execution = claimed(&f, f.node_a).await;
        f.machine.start(&mut execution).await.unwrap();
        f.machine.pause(f.node_a).await.unwrap();

        f.machine.pass(&mut execution, Vec::new()).await.unwrap();

        assert_eq!(f.store.node(f.node_a).await.unwrap().state, NodeState::Paused);
        assert!(f.store.execution(execution.id).await.unwrap().is_passed());
    }

    #[tokio::test]
    async fn fail_records_reason_message_and_signals() {
        let f = fixture().await;
        let mut execution = claimed(&f, f.node_a).await;
        f.machine.start(&mut execution).await.unwrap();

        f.machine
            .fail(&mut execution, ResultReason::Error, Some("remote 503".into()))
            .await
            .unwrap();

        let row = f.store.execution(execution.id).await.unwrap();
        assert!(row.has_unresolved_error());
        assert_eq!(row.failure_message.as_deref(), Some("remote 503"));
        assert_eq!(f.store.node(f.node_a).await.unwrap().state, NodeState::Ready);
        assert_eq!(*f.notifier.failed.lock(), vec![execution.id]);
    }

    #[tokio::test]
    async fn fail_cascades_up_active_ancestors() {
        let f = fixture().await;
        let grandparent = Execution::new(f.workflow_id, f.node_a, EventId::v4(), EventId::v4());
        let parent = Execution::new(f.workflow_id, f.node_a, EventId::v4(), EventId::v4())
            .with_parent_execution(grandparent.id);
        let mut child = Execution::new(f.workflow_id, f.node_b, EventId::v4(), EventId::v4())
            .with_parent_execution(parent.id);
        f.store.insert_execution(grandparent.clone()).await.unwrap();
        f.store.insert_execution(parent.clone()).await.unwrap();
        f.store.insert_execution(child.clone()).await.unwrap();

        f.machine
            .fail(&mut child, ResultReason::Error, Some("boom".into()))
            .await
            .unwrap();

        for id in [child.id, parent.id, grandparent.id] {
            let row = f.store.execution(id).await.unwrap();
            assert!(row.is_failed(), "{id} should have failed");
            assert_eq!(row.failure_message.as_deref(), Some("boom"));
        }
        assert_eq!(
            *f.notifier.failed.lock(),
            vec![child.id, parent.id, grandparent.id]
        );
    }

    #[tokio::test]
    async fn fail_cascade_stops_at_a_settled_ancestor() {
        let f = fixture().await;
        let mut parent = Execution::new(f.workflow_id, f.node_a, EventId::v4(), EventId::v4());
        parent.start().unwrap();
        parent.pass().unwrap();
        let mut child = Execution::new(f.workflow_id, f.node_b, EventId::v4(), EventId::v4())
            .with_parent_execution(parent.id);
        f.store.insert_execution(parent.clone()).await.unwrap();
        f.store.insert_execution(child.clone()).await.unwrap();

        f.machine
            .fail(&mut child, ResultReason::Error, None)
            .await
            .unwrap();

        assert!(f.store.execution(parent.id).await.unwrap().is_passed());
        assert_eq!(*f.notifier.failed.lock(), vec![child.id]);
    }

    #[tokio::test]
    async fn cancel_rejects_nested_executions() {
        let f = fixture().await;
        let parent = Execution::new(f.workflow_id, f.node_a, EventId::v4(), EventId::v4());
        let child = Execution::new(f.workflow_id, f.node_b, EventId::v4(), EventId::v4())
            .with_parent_execution(parent.id);
        f.store.insert_execution(parent).await.unwrap();
        f.store.insert_execution(child.clone()).await.unwrap();

        let err = f.machine.cancel(child.id, "operator").await.unwrap_err();
        assert!(matches!(err, EngineError::ChildCancellation(id) if id == child.id));
        assert!(f.store.execution(child.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn cancel_cascades_to_active_children_only() {
        let f = fixture().await;
        let parent = Execution::new(f.workflow_id, f.node_a, EventId::v4(), EventId::v4());
        let mut running = Execution::new(f.workflow_id, f.node_b, EventId::v4(), EventId::v4())
            .with_parent_execution(parent.id);
        running.start().unwrap();
        let mut finished = Execution::new(f.workflow_id, f.node_b, EventId::v4(), EventId::v4())
            .with_parent_execution(parent.id);
        finished.start().unwrap();
        finished.pass().unwrap();
        let grandchild = Execution::new(f.workflow_id, f.node_b, EventId::v4(), EventId::v4())
            .with_parent_execution(running.id);
        f.store.insert_execution(parent.clone()).await.unwrap();
        f.store.insert_execution(running.clone()).await.unwrap();
        f.store.insert_execution(finished.clone()).await.unwrap();
        f.store.insert_execution(grandchild.clone()).await.unwrap();

        f.machine.cancel(parent.id, "operator@example.com").await.unwrap();

        for id in [parent.id, running.id, grandchild.id] {
            let row = f.store.execution(id).await.unwrap();
            assert!(row.is_cancelled(), "{id} should be cancelled");
            assert_eq!(row.cancelled_by(), Some("operator@example.com"));
        }
        let row = f.store.execution(finished.id).await.unwrap();
        assert_eq!(row.result, Some(ExecutionResult::Passed));
    }

    #[tokio::test]
    async fn cancel_releases_the_node() {
        let f = fixture().await;
        let mut execution = claimed(&f, f.node_a).await;
        f.machine.start(&mut execution).await.unwrap();
        assert_eq!(
            f.store.node(f.node_a).await.unwrap().state,
            NodeState::Processing
        );

        f.machine.cancel(execution.id, "operator").await.unwrap();

        assert_eq!(f.store.node(f.node_a).await.unwrap().state, NodeState::Ready);
    }

    #[tokio::test]
    async fn cancel_of_a_settled_root_is_rejected() {
        let f = fixture().await;
        let mut execution = Execution::new(f.workflow_id, f.node_a, EventId::v4(), EventId::v4());
        execution.start().unwrap();
        execution.pass().unwrap();
        f.store.insert_execution(execution.clone()).await.unwrap();

        assert!(f.machine.cancel(execution.id, "operator").await.is_err());
    }

    #[tokio::test]
    async fn pause_rejects_an_already_paused_node() {
        let f = fixture().await;
        f.machine.pause(f.node_a).await.unwrap();

        let err = f.machine.pause(f.node_a).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid node transition from paused to paused"
        );
    }

    #[tokio::test]
    async fn resume_without_running_executions_goes_ready() {
        let f = fixture().await;
        f.machine.pause(f.node_a).await.unwrap();

        f.machine.resume(f.node_a).await.unwrap();

        assert_eq!(f.store.node(f.node_a).await.unwrap().state, NodeState::Ready);
    }

    #[tokio::test]
    async fn resume_with_a_running_execution_goes_processing() {
        let f = fixture().await;
        let mut execution = claimed(&f, f.node_a).await;
        f.machine.start(&mut execution).await.unwrap();
        f.machine.pause(f.node_a).await.unwrap();

        f.machine.resume(f.node_a).await.unwrap();

        assert_eq!(
            f.store.node(f.node_a).await.unwrap().state,
            NodeState::Processing
        );
    }

    #[tokio::test]
    async fn resume_of_a_ready_node_is_rejected() {
        let f = fixture().await;
        assert!(f.machine.resume(f.node_a).await.is_err());
    }

    #[tokio::test]
    async fn resolve_error_acknowledges_a_failure() {
        let f = fixture().await;
        let mut execution = claimed(&f, f.node_a).await;
        f.machine.start(&mut execution).await.unwrap();
        f.machine
            .fail(&mut execution, ResultReason::Error, Some("boom".into()))
            .await
            .unwrap();

        let resolved = f.machine.resolve_error(execution.id).await.unwrap();

        assert!(!resolved.has_unresolved_error());
        assert!(!f
            .store
            .execution(execution.id)
            .await
            .unwrap()
            .has_unresolved_error());
    }

    #[tokio::test]
    async fn resolve_error_rejects_a_passed_execution() {
        let f = fixture().await;
        let mut execution = claimed(&f, f.node_a).await;
        f.machine.start(&mut execution).await.unwrap();
        f.machine.pass(&mut execution, Vec::new()).await.unwrap();

        assert!(f.machine.resolve_error(execution.id).await.is_err());
    }
}
