//! Engine tuning knobs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Everything an embedder can tune about the engine.
///
/// All fields have working defaults; `#[serde(default)]` lets a config file
/// set only what it cares about. The one field worth setting explicitly in
/// any real deployment is `token_secret`: the default is random per process,
/// so callback tokens stop verifying across restarts or between replicas.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a worker sleeps after a pass that found nothing to do.
    #[serde(with = "serde_duration")]
    pub idle_backoff: Duration,
    /// How often a worker sweeps overdue field sets.
    #[serde(with = "serde_duration")]
    pub sweep_interval: Duration,
    /// Lifetime of issued callback tokens.
    #[serde(with = "serde_duration")]
    pub token_ttl: Duration,
    /// HS256 signing key for callback tokens.
    pub token_secret: String,
    /// How many async executions one poll pass checks.
    pub poll_batch: usize,
    /// How many pending events one routing pass fans out.
    pub route_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(100),
            sweep_interval: Duration::from_secs(1),
            token_ttl: Duration::from_secs(15 * 60),
            token_secret: uuid::Uuid::new_v4().simple().to_string(),
            poll_batch: 16,
            route_batch: 64,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker idle backoff.
    #[must_use]
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Sets the field-set sweep interval.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the callback token lifetime.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Sets the callback token signing key.
    #[must_use]
    pub fn with_token_secret(mut self, secret: impl Into<String>) -> Self {
        self.token_secret = secret.into();
        self
    }

    /// Sets the poll batch size.
    #[must_use]
    pub fn with_poll_batch(mut self, batch: usize) -> Self {
        self.poll_batch = batch;
        self
    }

    /// Sets the routing batch size.
    #[must_use]
    pub fn with_route_batch(mut self, batch: usize) -> Self {
        self.route_batch = batch;
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("idle_backoff", &self.idle_backoff)
            .field("sweep_interval", &self.sweep_interval)
            .field("token_ttl", &self.token_ttl)
            .field("token_secret", &"[REDACTED]")
            .field("poll_batch", &self.poll_batch)
            .field("route_batch", &self.route_batch)
            .finish()
    }
}

/// Serde helper for `Duration` serialized as integer milliseconds.
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
