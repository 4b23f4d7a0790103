//! The failure notification seam.

use sirocco_execution::Execution;
use sirocco_workflow::Node;

/// Receives one signal per execution transitioning to `failed`.
///
/// Cascaded failures signal once per level: a failing blueprint child raises
/// for itself and then, as the cascade climbs, for each failed ancestor.
/// Delivery (mail, chat, incident tooling) is the implementor's business;
/// the engine only guarantees the signal itself. Implementations must not
/// block: the engine calls this inline from the failure path.
pub trait Notifier: Send + Sync {
    /// `execution` just transitioned to `failed` while running `node`.
    fn execution_failed(&self, execution: &Execution, node: &Node);
}

/// The default [`Notifier`]: an error-level `tracing` event per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn execution_failed(&self, execution: &Execution, node: &Node) {
        tracing::error!(
            execution = %execution.id,
            workflow = %execution.workflow_id,
            node = %node.id,
            node_name = %node.name,
            message = execution.failure_message.as_deref().unwrap_or(""),
            "execution failed"
        );
    }
}
