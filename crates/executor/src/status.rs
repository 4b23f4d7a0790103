//! The status an executor reports for one unit of remote work.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a check observed: whether the work is done, whether it succeeded,
/// and what it produced.
///
/// Outputs are `(channel, payload)` pairs; a successful execution may emit
/// on several channels, or several times on one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckStatus {
    finished: bool,
    successful: bool,
    outputs: Vec<(String, Value)>,
    message: Option<String>,
}

impl CheckStatus {
    /// Work is still in flight.
    #[must_use]
    pub fn running() -> Self {
        Self {
            finished: false,
            successful: false,
            outputs: Vec::new(),
            message: None,
        }
    }

    /// Work finished successfully with these outputs.
    #[must_use]
    pub fn success(outputs: Vec<(String, Value)>) -> Self {
        Self {
            finished: true,
            successful: true,
            outputs,
            message: None,
        }
    }

    /// Work finished unsuccessfully.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            finished: true,
            successful: false,
            outputs: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// Whether the work has reached a final state.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Whether the work succeeded. Meaningful only once finished.
    #[must_use]
    pub fn successful(&self) -> bool {
        self.successful
    }

    /// The `(channel, payload)` pairs the work produced.
    #[must_use]
    pub fn outputs(&self) -> &[(String, Value)] {
        &self.outputs
    }

    /// Consumes the status, handing out the outputs.
    #[must_use]
    pub fn into_outputs(self) -> Vec<(String, Value)> {
        self.outputs
    }

    /// The failure message, when the work failed.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
