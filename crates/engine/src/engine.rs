//! The orchestration step: claim, resolve, execute, settle, route, sweep.

use std::sync::Arc;

use chrono::Utc;
use sirocco_core::{ExecutionId, NodeId};
use sirocco_credential::SecretProvider;
use sirocco_execution::{Event, Execution, ResultReason};
use sirocco_executor::{
    CheckStatus, ExecutionRequest, ExecutorError, ExecutorRegistry, TokenSigner,
};
use sirocco_join::Aggregator;
use sirocco_store::Store;
use sirocco_workflow::{Node, Workflow};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::machine::StateMachine;
use crate::notify::{Notifier, TracingNotifier};
use crate::resolve::ConfigResolver;
use crate::router::Router;

/// One engine over one store: the owner of the claim-resolve-execute-settle
/// cycle and of the routing and sweeping passes around it.
///
/// Cheap to clone; clones share everything. Any number of engines and
/// workers may run over the same store concurrently.
pub struct Engine<S> {
    store: Arc<S>,
    registry: Arc<ExecutorRegistry>,
    machine: StateMachine<S>,
    resolver: ConfigResolver<S>,
    router: Router<S>,
    aggregator: Aggregator<S>,
    signer: TokenSigner,
    config: EngineConfig,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            machine: self.machine.clone(),
            resolver: self.resolver.clone(),
            router: self.router.clone(),
            aggregator: self.aggregator.clone(),
            signer: self.signer.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> Engine<S> {
    /// Creates an engine with the default failure signal (structured logs).
    pub fn new(
        store: Arc<S>,
        registry: Arc<ExecutorRegistry>,
        secrets: Arc<dyn SecretProvider>,
        config: EngineConfig,
    ) -> Self {
        Self::with_notifier(store, registry, secrets, config, Arc::new(TracingNotifier))
    }

    /// Creates an engine raising failure signals through `notifier`.
    pub fn with_notifier(
        store: Arc<S>,
        registry: Arc<ExecutorRegistry>,
        secrets: Arc<dyn SecretProvider>,
        config: EngineConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let aggregator = Aggregator::new(Arc::clone(&store));
        let signer = TokenSigner::new(config.token_secret.as_bytes(), config.token_ttl);
        Self {
            machine: StateMachine::new(Arc::clone(&store), notifier),
            resolver: ConfigResolver::new(Arc::clone(&store), secrets),
            router: Router::new(Arc::clone(&store), aggregator.clone()),
            aggregator,
            signer,
            registry,
            config,
            store,
        }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stores an externally-triggered event for routing.
    ///
    /// The entry point for trigger surfaces: trigger nodes never execute,
    /// they only lend their identity (and edges) to injected events.
    pub async fn inject(&self, event: Event) -> Result<(), EngineError> {
        tracing::debug!(event = %event.id, node = %event.node_id, "event injected");
        self.store.insert_event(event).await?;
        Ok(())
    }

    /// Runs one claim-resolve-execute-settle cycle. Returns whether any
    /// work was claimed.
    ///
    /// Resolver and executor errors fail the claimed execution through the
    /// ordinary cascade; only store errors surface to the caller.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn step(&self) -> Result<bool, EngineError> {
        let Some(claim) = self.machine.claim().await? else {
            return Ok(false);
        };
        let node = claim.node;
        let mut execution = claim.execution;
        let workflow = self.store.workflow(node.workflow_id).await?;
        self.machine.start(&mut execution).await?;

        if let Err(err) = self.run_execution(&workflow, &node, &mut execution).await {
            tracing::warn!(execution = %execution.id, error = %err, "execution errored");
            self.machine
                .fail(&mut execution, ResultReason::Error, Some(err.to_string()))
                .await?;
        }
        Ok(true)
    }

    /// Polls one waiting asynchronous execution. Returns whether this call
    /// settled it.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn poll(&self, id: ExecutionId) -> Result<bool, EngineError> {
        let execution = self.store.execution(id).await?;
        if execution.is_terminal() {
            return Ok(false);
        }
        let Some(async_id) = execution.async_id().map(str::to_owned) else {
            return Ok(false);
        };
        let node = self.store.node(execution.node_id).await?;
        let executor = self
            .registry
            .get(&node.component)
            .ok_or_else(|| ExecutorError::UnknownComponent(node.component.clone()))?;

        let checked = executor.async_check(&async_id).await;

        // The check ran unlocked; a cancellation may have settled the row
        // meanwhile. Re-read and let the stored fact win.
        let mut execution = self.store.execution(id).await?;
        if execution.is_terminal() {
            return Ok(false);
        }
        match checked {
            Ok(status) if !status.finished() => Ok(false),
            Ok(status) => {
                self.settle(&mut execution, status).await?;
                Ok(true)
            }
            Err(err) => {
                self.machine
                    .fail(&mut execution, ResultReason::Error, Some(err.to_string()))
                    .await?;
                Ok(true)
            }
        }
    }

    /// Polls every waiting asynchronous execution, oldest first. Returns
    /// how many settled.
    pub async fn poll_due(&self) -> Result<usize, EngineError> {
        let due = self
            .store
            .pollable_executions(self.config.poll_batch)
            .await?;
        let mut settled = 0;
        for execution in due {
            if self.poll(execution.id).await? {
                settled += 1;
            }
        }
        Ok(settled)
    }

    /// Routes pending events along workflow edges. Returns how many events
    /// were consumed.
    pub async fn route(&self) -> Result<usize, EngineError> {
        self.router.route_pending(self.config.route_batch).await
    }

    /// Applies timeout behavior to overdue field sets across every stored
    /// workflow. Returns how many partial events were emitted.
    pub async fn sweep(&self) -> Result<usize, EngineError> {
        let mut emitted = 0;
        for workflow in self.store.workflows().await? {
            emitted += self.aggregator.sweep(&workflow, Utc::now()).await?.len();
        }
        Ok(emitted)
    }

    /// Excludes `node` from claiming until resumed.
    pub async fn pause(&self, node: NodeId) -> Result<(), EngineError> {
        self.machine.pause(node).await
    }

    /// Reopens a paused node.
    pub async fn resume(&self, node: NodeId) -> Result<(), EngineError> {
        self.machine.resume(node).await
    }

    /// Cancels a root execution and every still-active descendant.
    pub async fn cancel(
        &self,
        execution: ExecutionId,
        cancelled_by: &str,
    ) -> Result<(), EngineError> {
        self.machine.cancel(execution, cancelled_by).await
    }

    /// Acknowledges a failed execution: `error` becomes `error_resolved`.
    pub async fn resolve_error(&self, execution: ExecutionId) -> Result<Execution, EngineError> {
        self.machine.resolve_error(execution).await
    }

    async fn run_execution(
        &self,
        workflow: &Workflow,
        node: &Node,
        execution: &mut Execution,
    ) -> Result<(), EngineError> {
        let resolved = self.resolver.build(workflow, node, execution).await?;
        execution.configuration = resolved.snapshot.clone();
        if !resolved.deferred.is_empty() {
            execution
                .set_deferred_paths(resolved.deferred.iter().map(ToString::to_string).collect());
        }
        // The snapshot is persisted before secrets enter the picture.
        self.store.update_execution(execution.clone()).await?;

        // Dispatch configuration lives only on this stack frame.
        let configuration = self.resolver.runtime(workflow, execution, &resolved).await?;
        let request = ExecutionRequest {
            execution_id: execution.id,
            node_id: node.id,
            workflow_id: workflow.id,
            organization_id: workflow.organization_id,
            configuration,
            callback_token: self.signer.issue(execution.id)?,
        };

        let executor = self
            .registry
            .get(&node.component)
            .ok_or_else(|| ExecutorError::UnknownComponent(node.component.clone()))?;
        tracing::debug!(
            execution = %execution.id,
            component = %node.component,
            "dispatching to executor"
        );
        let resource = executor.execute(request).await?;

        if resource.is_async() {
            let async_id = resource.async_id().ok_or(ExecutorError::MissingAsyncId)?;
            tracing::debug!(
                execution = %execution.id,
                async_id = %async_id,
                "execution went asynchronous"
            );
            execution.set_async_id(async_id);
            self.store.update_execution(execution.clone()).await?;
            return Ok(());
        }

        let status = resource.check().await?;
        if !status.finished() {
            return Err(ExecutorError::check(
                "synchronous resource reported unfinished work",
            )
            .into());
        }
        self.settle(execution, status).await
    }

    async fn settle(
        &self,
        execution: &mut Execution,
        status: CheckStatus,
    ) -> Result<(), EngineError> {
        if status.successful() {
            self.machine.pass(execution, status.into_outputs()).await
        } else {
            let message = status.message().map(str::to_owned);
            self.machine
                .fail(execution, ResultReason::Error, message)
                .await
        }
    }
}
