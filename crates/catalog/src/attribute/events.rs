//! Attribute domain events.

use serde::{Deserialize, Serialize};

use domain::DomainEvent;

/// Events raised by an [`Attribute`](super::Attribute).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AttributeEvent {
    /// Attribute was created.
    AttributeCreated(AttributeCreatedData),

    /// Attribute was deleted.
    AttributeDeleted,
}

impl DomainEvent for AttributeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AttributeEvent::AttributeCreated(_) => "AttributeCreated",
            AttributeEvent::AttributeDeleted => "AttributeDeleted",
        }
    }
}

/// Data for AttributeCreated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeCreatedData {
    pub name: String,
}
