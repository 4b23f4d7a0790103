//! The executor trait and the request it receives.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use sirocco_core::{ExecutionId, NodeId, OrganizationId, WorkflowId};

use crate::error::ExecutorError;
use crate::resource::Resource;
use crate::status::CheckStatus;

/// Everything an executor gets for one execution: non-secret correlation
/// fields, the runtime-resolved configuration, and a signed callback token.
#[derive(Clone)]
pub struct ExecutionRequest {
    /// The execution being run.
    pub execution_id: ExecutionId,
    /// The node that owns it.
    pub node_id: NodeId,
    /// The workflow the node belongs to.
    pub workflow_id: WorkflowId,
    /// The organization owning the workflow.
    pub organization_id: OrganizationId,
    /// Runtime-resolved configuration. May carry secret material; never
    /// persisted, never logged.
    pub configuration: Value,
    /// Time-boxed HS256 token the remote side presents when calling back.
    pub callback_token: String,
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("execution_id", &self.execution_id)
            .field("node_id", &self.node_id)
            .field("workflow_id", &self.workflow_id)
            .field("organization_id", &self.organization_id)
            .field("configuration", &"[REDACTED]")
            .field("callback_token", &"[REDACTED]")
            .finish()
    }
}

/// One concrete integration, registered under a component key.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Starts the work described by `request` and returns a handle to it.
    async fn execute(&self, request: ExecutionRequest)
    -> Result<Box<dyn Resource>, ExecutorError>;

    /// Resumes polling from a correlation id alone, with no access to the
    /// original [`Resource`]. Executors that only ever return synchronous
    /// resources keep the default.
    async fn async_check(&self, async_id: &str) -> Result<CheckStatus, ExecutorError> {
        let _ = async_id;
        Err(ExecutorError::AsyncUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::SyncResource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixed;

    #[async_trait]
    impl Executor for Fixed {
        async fn execute(
            &self,
            _request: ExecutionRequest,
        ) -> Result<Box<dyn Resource>, ExecutorError> {
            Ok(Box::new(SyncResource::new(CheckStatus::success(Vec::new()))))
        }
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            execution_id: ExecutionId::v4(),
            node_id: NodeId::v4(),
            workflow_id: WorkflowId::v4(),
            organization_id: OrganizationId::v4(),
            configuration: json!({"password": "hunter2"}),
            callback_token: "signed.jwt.token".into(),
        }
    }

    #[test]
    fn debug_never_prints_configuration_or_token() {
        let rendered = format!("{:?}", request());
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("signed.jwt.token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn async_check_defaults_to_unsupported() {
        let err = Fixed.async_check("job-1").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "executor does not support asynchronous checks"
        );
    }
}
