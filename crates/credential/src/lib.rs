#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sirocco Credential
//!
//! Secret loading for the sirocco orchestration engine.
//!
//! Secrets live behind the [`SecretProvider`] seam and reach expressions only
//! through the runtime resolution pass, after the build-time configuration
//! snapshot has already been persisted. Values travel as [`SecretString`]:
//! zeroed on drop and redacted in `Debug`, `Display`, and serialization, so
//! the material cannot stray into logs or stored state.
//!
//! [`MemorySecretProvider`] is the in-process implementation used by tests
//! and single-node deployments.

mod error;
mod provider;
mod secret;

pub use error::CredentialError;
pub use provider::{MemorySecretProvider, SecretFields, SecretProvider};
pub use secret::SecretString;
