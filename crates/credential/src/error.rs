//! Credential lookup failures.

use sirocco_core::OrganizationId;
use thiserror::Error;

/// Errors from secret providers.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The organization has no secret under that name.
    #[error("secret '{name}' not found for organization {organization}")]
    NotFound {
        /// Whose secrets were searched.
        organization: OrganizationId,
        /// The requested secret name.
        name: String,
    },

    /// The backing provider failed. The message never carries secret
    /// material.
    #[error("secret provider error: {0}")]
    Provider(String),
}

impl CredentialError {
    /// Builds a [`CredentialError::Provider`].
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }
}
