//! The aggregator: attaching events to field sets and emitting combinations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use sirocco_core::{EventId, WorkflowId};
use sirocco_execution::{Event, FieldSet, FieldSetEvent, FieldSetState, QueueItem};
use sirocco_expression::{PayloadEnvironment, evaluate_source};
use sirocco_store::Store;
use sirocco_workflow::{ConnectionGroup, DEFAULT_CHANNEL, TimeoutBehavior, Workflow};

use crate::error::JoinError;
use crate::key::field_set_hash;

/// Collects events arriving over a group's connections into per-key field
/// sets and emits one combined event per satisfied set.
///
/// Safe under concurrent ingestion: attachment goes through the store's
/// race-free upsert, and emission is guarded by the compare-and-set close,
/// so racing workers produce exactly one combined event per set.
pub struct Aggregator<S> {
    store: Arc<S>,
}

impl<S> Clone for Aggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> Aggregator<S> {
    /// Creates an aggregator over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Store> Aggregator<S> {
    /// Ingests one event arriving at `group` over `connection`.
    ///
    /// Extracts the key fields from the event payload, attaches the event to
    /// the open field set for that key (creating it on first sight), and
    /// emits the combined event when the group's policy is satisfied.
    /// Returns the combined event if this ingestion triggered emission.
    pub async fn ingest(
        &self,
        workflow_id: WorkflowId,
        group: &ConnectionGroup,
        connection: &str,
        event: &Event,
        root_event_id: EventId,
    ) -> Result<Option<Event>, JoinError> {
        let fields = extract_fields(group, &event.payload)?;
        let key_hash = field_set_hash(&fields);
        let attachment =
            FieldSetEvent::new(connection, event.id, event.payload.clone(), root_event_id);
        let set = self
            .store
            .attach_field_set(group.id, &key_hash, fields, attachment)
            .await?;

        tracing::debug!(
            group = %group.id,
            field_set = %set.id,
            connection,
            attached = set.attached_count(),
            required = group.required_connections(),
            "event attached to field set"
        );

        if !group
            .policy
            .kind
            .satisfied(set.attached_count(), group.required_connections())
        {
            return Ok(None);
        }
        if !self
            .store
            .close_field_set(set.id, FieldSetState::Emitted)
            .await?
        {
            // A racing ingestion closed the set first; it emits.
            return Ok(None);
        }
        // Reload after winning the close: attachments that landed between
        // our read and the close belong in the combined payload.
        let set = self.store.field_set(set.id).await?;
        let combined = self.emit(workflow_id, group, &set).await?;
        Ok(Some(combined))
    }

    /// Applies each group's timeout behavior to its overdue open sets.
    ///
    /// `fail` marks the set errored, `drop` deletes it silently,
    /// `emit_partial` emits immediately with whatever arrived. Returns the
    /// events emitted by partial emission.
    pub async fn sweep(
        &self,
        workflow: &Workflow,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, JoinError> {
        let mut emitted = Vec::new();
        for group in &workflow.connection_groups {
            for set in self.store.open_field_sets(group.id).await? {
                if !set.is_overdue(group.policy.timeout, now) {
                    continue;
                }
                match group.policy.timeout_behavior {
                    TimeoutBehavior::Fail => {
                        if self
                            .store
                            .close_field_set(set.id, FieldSetState::Errored)
                            .await?
                        {
                            tracing::warn!(
                                group = %group.id,
                                field_set = %set.id,
                                attached = set.attached_count(),
                                "field set timed out, marked errored"
                            );
                        }
                    }
                    TimeoutBehavior::Drop => {
                        if self.store.delete_field_set(set.id).await? {
                            tracing::debug!(
                                group = %group.id,
                                field_set = %set.id,
                                "field set timed out, dropped"
                            );
                        }
                    }
                    TimeoutBehavior::EmitPartial => {
                        if self
                            .store
                            .close_field_set(set.id, FieldSetState::Emitted)
                            .await?
                        {
                            let set = self.store.field_set(set.id).await?;
                            emitted.push(self.emit(workflow.id, group, &set).await?);
                        }
                    }
                }
            }
        }
        Ok(emitted)
    }

    /// Builds, stores, and enqueues the combined event for a closed set.
    ///
    /// The combined event is inserted already `routed` and enqueued straight
    /// at the consumer node: its `node_id` is the consumer (its address),
    /// not a producer, so it must never reach the router's fan-out.
    async fn emit(
        &self,
        workflow_id: WorkflowId,
        group: &ConnectionGroup,
        set: &FieldSet,
    ) -> Result<Event, JoinError> {
        let mut payload = serde_json::Map::new();
        for (name, value) in &set.fields {
            payload.insert(name.clone(), value.clone());
        }
        let mut events = serde_json::Map::new();
        for attachment in &set.events {
            events.insert(attachment.connection.clone(), attachment.payload.clone());
        }
        payload.insert("events".to_owned(), Value::Object(events));

        let missing: Vec<Value> = group
            .connection_names()
            .into_iter()
            .filter(|name| !set.has_connection(name))
            .map(Value::from)
            .collect();
        if !missing.is_empty() {
            payload.insert("missing".to_owned(), Value::Array(missing));
        }

        let mut combined = Event::root(group.node_id, DEFAULT_CHANNEL, Value::Object(payload));
        combined.mark_routed();
        self.store.insert_event(combined.clone()).await?;

        // The chain of the combined event originates wherever its earliest
        // attachment did.
        let root = set
            .oldest_attachment()
            .map_or(combined.id, |a| a.root_event_id);
        self.store
            .enqueue(QueueItem::new(workflow_id, group.node_id, combined.id, root))
            .await?;

        tracing::info!(
            group = %group.id,
            field_set = %set.id,
            event = %combined.id,
            "combined event emitted"
        );
        Ok(combined)
    }
}

/// Evaluates the group's field expressions against an event payload.
fn extract_fields(
    group: &ConnectionGroup,
    payload: &Value,
) -> Result<IndexMap<String, Value>, JoinError> {
    let env = PayloadEnvironment::new(payload);
    let mut fields = IndexMap::with_capacity(group.fields.len());
    for (name, expression) in &group.fields {
        let value =
            evaluate_source(expression, &env).map_err(|source| JoinError::Extraction {
                field: name.clone(),
                source,
            })?;
        fields.insert(name.clone(), value);
    }
    Ok(fields)
}
