//! Executor adapter failures.

use thiserror::Error;

/// Errors from executors, resources, and callback tokens.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// No executor is registered under the component key.
    #[error("no executor registered for component '{0}'")]
    UnknownComponent(String),

    /// The outbound call failed to start.
    #[error("request failed: {0}")]
    Request(String),

    /// A status check failed.
    #[error("status check failed: {0}")]
    Check(String),

    /// The executor cannot resume polling from a correlation id.
    #[error("executor does not support asynchronous checks")]
    AsyncUnsupported,

    /// An asynchronous resource came back without a correlation id.
    #[error("asynchronous resource returned no correlation id")]
    MissingAsyncId,

    /// Callback token signing or verification failed.
    #[error("callback token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl ExecutorError {
    /// Builds an [`ExecutorError::Request`].
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    /// Builds an [`ExecutorError::Check`].
    #[must_use]
    pub fn check(message: impl Into<String>) -> Self {
        Self::Check(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_name_the_failing_side() {
        assert_eq!(
            ExecutorError::UnknownComponent("http.request".into()).to_string(),
            "no executor registered for component 'http.request'"
        );
        assert_eq!(
            ExecutorError::request("connection refused").to_string(),
            "request failed: connection refused"
        );
        assert_eq!(
            ExecutorError::check("remote 500").to_string(),
            "status check failed: remote 500"
        );
    }
}
