//! Domain events and the envelope they are published in.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use common::AggregateId;
use entity_store::Version;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// A fact recorded by an aggregate, named in past tense.
///
/// Domain and integration events share this trait; both are queued on
/// the aggregate and handed to the publisher after a successful commit.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    fn event_type(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An event as queued on the aggregate that raised it.
///
/// Identity and timestamp are fixed at the moment the event is raised,
/// so a retried publication carries the same id.
#[derive(Debug, Clone)]
pub struct RaisedEvent<E> {
    pub event_id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub event: E,
}

impl<E> RaisedEvent<E> {
    pub fn new(event: E) -> Self {
        Self {
            event_id: EventId::new(),
            occurred_at: Utc::now(),
            event,
        }
    }
}

impl<E: DomainEvent> RaisedEvent<E> {
    /// Wraps the event for publication, attributing it to the entity
    /// version that the enclosing commit wrote.
    pub fn seal(
        &self,
        source: &EventSource,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> serde_json::Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            event_type: self.event.event_type().to_string(),
            aggregate_id: source.aggregate_id,
            aggregate_type: source.aggregate_type.to_string(),
            aggregate_version: source.version,
            occurred_at: self.occurred_at,
            payload: serde_json::to_value(&self.event)?,
            metadata: metadata.clone(),
        })
    }
}

/// The committed entity an event is attributed to.
#[derive(Debug, Clone, Copy)]
pub struct EventSource {
    pub aggregate_id: AggregateId,
    pub aggregate_type: &'static str,
    pub version: Version,
}

/// Serialized form of a raised event, as handed to an
/// [`EventPublisher`](crate::EventPublisher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    /// e.g. "BrandRenamed"
    pub event_type: String,
    pub aggregate_id: AggregateId,
    /// e.g. "Brand"
    pub aggregate_type: String,
    pub aggregate_version: Version,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// Commit metadata: `actor`, plus `request_id` when dispatched
    /// through the pipeline.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Deserializes the payload back into a typed event.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, serde_json::Error> {
        E::deserialize(&self.payload)
    }

    /// Looks up a string-valued metadata entry.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}
