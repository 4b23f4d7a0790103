//! Signed callback tokens handed to remote systems.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sirocco_core::ExecutionId;

use crate::error::ExecutorError;

/// Claims inside a callback token. `sub` is the execution the bearer may
/// report on; `exp` bounds how long the grant lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackClaims {
    /// The execution id, as a UUID string.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: u64,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

impl CallbackClaims {
    /// The execution this token speaks for.
    #[must_use]
    pub fn execution_id(&self) -> Option<ExecutionId> {
        ExecutionId::parse(&self.sub).ok()
    }
}

/// Issues and verifies the HS256 tokens that let a remote system call back
/// into the engine about one specific execution.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenSigner {
    /// Creates a signer over a shared secret. Every issued token expires
    /// `ttl` after issue.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Issues a fresh token scoped to `execution_id`.
    pub fn issue(&self, execution_id: ExecutionId) -> Result<String, ExecutorError> {
        let iat = Utc::now().timestamp() as u64;
        let claims = CallbackClaims {
            sub: execution_id.to_string(),
            iat,
            exp: iat + self.ttl.as_secs(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verifies a presented token (signature and expiry) and returns its
    /// claims.
    pub fn verify(&self, token: &str) -> Result<CallbackClaims, ExecutorError> {
        let data = decode::<CallbackClaims>(
            token,
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SECRET: &[u8] = b"test-signing-secret";

    #[test]
    fn issued_tokens_verify_and_name_the_execution() {
        let signer = TokenSigner::new(SECRET, Duration::from_secs(600));
        let execution_id = ExecutionId::v4();

        let token = signer.issue(execution_id).unwrap();
        let claims = signer.verify(&token).unwrap();

        assert_eq!(claims.execution_id(), Some(execution_id));
        assert_eq!(claims.exp, claims.iat + 600);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let signer = TokenSigner::new(SECRET, Duration::from_secs(600));
        let impostor = TokenSigner::new(b"some-other-secret", Duration::from_secs(600));

        let token = impostor.issue(ExecutionId::v4()).unwrap();
        let err = signer.verify(&token).unwrap_err();
        assert!(matches!(err, ExecutorError::Token(_)));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let signer = TokenSigner::new(SECRET, Duration::from_secs(600));
        assert!(signer.verify("not.a.jwt").is_err());
    }

    #[test]
    fn debug_does_not_print_key_material() {
        let signer = TokenSigner::new(SECRET, Duration::from_secs(600));
        let rendered = format!("{signer:?}");
        assert!(!rendered.contains("test-signing-secret"));
        assert!(rendered.contains("ttl"));
    }
}
