//! The secret provider seam and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sirocco_core::OrganizationId;

use crate::error::CredentialError;
use crate::secret::SecretString;

/// The fields of one named secret (for example `user` and `password`).
pub type SecretFields = HashMap<String, SecretString>;

/// Loads named secrets, scoped to an organization.
///
/// Invoked only during the runtime resolution pass; nothing on the
/// build-time path holds a provider.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Loads the fields of the secret `name` owned by `organization`.
    async fn load(
        &self,
        organization: OrganizationId,
        name: &str,
    ) -> Result<SecretFields, CredentialError>;
}

/// In-memory provider for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemorySecretProvider {
    secrets: RwLock<HashMap<(OrganizationId, String), SecretFields>>,
}

impl MemorySecretProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces a named secret for an organization.
    pub fn insert(
        &self,
        organization: OrganizationId,
        name: impl Into<String>,
        fields: SecretFields,
    ) {
        self.secrets
            .write()
            .insert((organization, name.into()), fields);
    }
}

#[async_trait]
impl SecretProvider for MemorySecretProvider {
    async fn load(
        &self,
        organization: OrganizationId,
        name: &str,
    ) -> Result<SecretFields, CredentialError> {
        self.secrets
            .read()
            .get(&(organization, name.to_owned()))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                organization,
                name: name.to_owned(),
            })
    }
}
