//! Resources: handles to work an executor has started.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutorError;
use crate::status::CheckStatus;

/// A handle to one started unit of remote work.
///
/// Synchronous work is already final when the handle comes back;
/// asynchronous work exposes a correlation id and reaches a final state only
/// in later checks.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Whether completion is observed by later checks rather than now.
    fn is_async(&self) -> bool;

    /// The stable external correlation id. Meaningful only when async;
    /// polling resumes from this id alone, surviving process restarts.
    fn async_id(&self) -> Option<String>;

    /// Observes the current status of the work.
    async fn check(&self) -> Result<CheckStatus, ExecutorError>;
}

/// Allow-list of outcome codes that count as success for a synchronous call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomePredicate {
    allowed: Vec<i64>,
}

impl OutcomePredicate {
    /// A predicate accepting exactly these codes.
    #[must_use]
    pub fn allow(codes: impl IntoIterator<Item = i64>) -> Self {
        Self {
            allowed: codes.into_iter().collect(),
        }
    }

    /// Whether `code` counts as success.
    #[must_use]
    pub fn accepts(&self, code: i64) -> bool {
        self.allowed.contains(&code)
    }
}

/// The resource for executors whose work finishes within the initial call.
#[derive(Debug, Clone)]
pub struct SyncResource {
    status: CheckStatus,
}

impl SyncResource {
    /// Wraps an already-final status.
    #[must_use]
    pub fn new(status: CheckStatus) -> Self {
        Self { status }
    }

    /// Judges an outcome code: allowed codes succeed with `outputs`, any
    /// other code fails with a message naming it.
    #[must_use]
    pub fn from_outcome(
        code: i64,
        outputs: Vec<(String, Value)>,
        predicate: &OutcomePredicate,
    ) -> Self {
        if predicate.accepts(code) {
            Self::new(CheckStatus::success(outputs))
        } else {
            Self::new(CheckStatus::failure(format!(
                "outcome code {code} is not an allowed success code"
            )))
        }
    }
}

#[async_trait]
impl Resource for SyncResource {
    fn is_async(&self) -> bool {
        false
    }

    fn async_id(&self) -> Option<String> {
        None
    }

    async fn check(&self) -> Result<CheckStatus, ExecutorError> {
        Ok(self.status.clone())
    }
}
