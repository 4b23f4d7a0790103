//! Field sets: per-key aggregation records for connection-group joins.

use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sirocco_core::{ConnectionGroupId, EventId, FieldSetId};

/// Lifecycle state of a [`FieldSet`].
///
/// Only `open` sets accept attachments and count toward the per-key
/// uniqueness rule; a later event with the same key after emission starts a
/// fresh set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSetState {
    /// Collecting attachments.
    Open,
    /// The combined event went out.
    Emitted,
    /// Timed out under the `fail` behavior.
    Errored,
}

impl FieldSetState {
    /// Whether the set still accepts attachments.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for FieldSetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Emitted => write!(f, "emitted"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// One inbound event attached to a field set under its connection name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSetEvent {
    /// Connection the event arrived on.
    pub connection: String,
    /// The attached event.
    pub event_id: EventId,
    /// Payload copied from the event at attach time, so emission never has
    /// to re-load the event row.
    pub payload: Value,
    /// Root event of the chain that delivered this attachment.
    pub root_event_id: EventId,
    /// Attach timestamp.
    pub attached_at: DateTime<Utc>,
}

impl FieldSetEvent {
    /// Creates an attachment for `connection`.
    #[must_use]
    pub fn new(
        connection: impl Into<String>,
        event_id: EventId,
        payload: Value,
        root_event_id: EventId,
    ) -> Self {
        Self {
            connection: connection.into(),
            event_id,
            payload,
            root_event_id,
            attached_at: Utc::now(),
        }
    }
}

/// The per-key aggregation record for one connection group.
///
/// Created the first time a key value is seen; every later event sharing the
/// key attaches to the same row until the group emits or the set times out.
/// At most one attachment per connection name is kept — the first one wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    /// Unique field set id.
    pub id: FieldSetId,
    /// Owning connection group.
    pub group_id: ConnectionGroupId,
    /// Order-invariant hash of `fields`; unique among the group's open sets.
    pub key_hash: String,
    /// Extracted field name → value map, in group declaration order.
    pub fields: IndexMap<String, Value>,
    /// Lifecycle state.
    pub state: FieldSetState,
    /// Attached events, at most one per connection name.
    #[serde(default)]
    pub events: Vec<FieldSetEvent>,
    /// Creation timestamp; the timeout clock starts here.
    pub created_at: DateTime<Utc>,
}

impl FieldSet {
    /// Creates an open, empty set for the given key.
    #[must_use]
    pub fn new(
        group_id: ConnectionGroupId,
        key_hash: impl Into<String>,
        fields: IndexMap<String, Value>,
    ) -> Self {
        Self {
            id: FieldSetId::v4(),
            group_id,
            key_hash: key_hash.into(),
            fields,
            state: FieldSetState::Open,
            events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether the set still accepts attachments.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Whether `connection` already has an attached event.
    #[must_use]
    pub fn has_connection(&self, connection: &str) -> bool {
        self.events.iter().any(|e| e.connection == connection)
    }

    /// The attachment recorded for `connection`, if any.
    #[must_use]
    pub fn attachment(&self, connection: &str) -> Option<&FieldSetEvent> {
        self.events.iter().find(|e| e.connection == connection)
    }

    /// Attaches an event. Returns `false` (and drops the attachment) if the
    /// connection already has one — the first attachment wins.
    pub fn attach(&mut self, event: FieldSetEvent) -> bool {
        if self.has_connection(&event.connection) {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Number of distinct connections with an attached event.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.events.len()
    }

    /// Names of connections with an attached event, in attach order.
    #[must_use]
    pub fn attached_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.connection.as_str()).collect()
    }

    /// The earliest attachment, if any. Its root event seeds the chain of
    /// the combined event.
    #[must_use]
    pub fn oldest_attachment(&self) -> Option<&FieldSetEvent> {
        self.events.first()
    }

    /// Whether the set has outlived `timeout` as of `now`.
    #[must_use]
    pub fn is_overdue(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(timeout)
            .is_ok_and(|timeout| now - self.created_at > timeout)
    }

    /// Marks the combined event as sent.
    pub fn mark_emitted(&mut self) {
        self.state = FieldSetState::Emitted;
    }

    /// Marks the set as timed out under the `fail` behavior.
    pub fn mark_errored(&mut self) {
        self.state = FieldSetState::Errored;
    }
}
