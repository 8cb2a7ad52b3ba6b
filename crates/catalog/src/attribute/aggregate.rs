//! Attribute aggregate.

use common::AggregateId;
use domain::{Aggregate, AggregateRoot};
use serde::{Deserialize, Serialize};

use super::events::{AttributeCreatedData, AttributeEvent};

/// A named product attribute.
#[derive(Debug, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(flatten)]
    root: AggregateRoot<AttributeEvent>,

    name: String,
}

impl Aggregate for Attribute {
    type Event = AttributeEvent;

    fn aggregate_type() -> &'static str {
        "Attribute"
    }

    fn root(&self) -> &AggregateRoot<AttributeEvent> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<AttributeEvent> {
        &mut self.root
    }
}

impl Attribute {
    pub fn create(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut attribute = Self {
            root: AggregateRoot::new(AggregateId::new()),
            name: name.clone(),
        };
        attribute
            .root
            .record(AttributeEvent::AttributeCreated(AttributeCreatedData { name }));
        attribute
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raises the deletion event. The unit of work turns the removal into a
    /// soft delete.
    pub fn delete(&mut self) {
        self.root.record(AttributeEvent::AttributeDeleted);
    }
}
