//! Product attributes (colour, size, material, ...).

mod aggregate;
mod events;
mod handlers;
mod requests;

pub use aggregate::Attribute;
pub use events::{AttributeCreatedData, AttributeEvent};
pub use handlers::{CreateAttributeHandler, DeleteAttributeHandler, GetAttributesHandler};
pub use requests::{
    AttributeView, CreateAttribute, DeleteAttribute, GetAttributes, validate_create_attribute,
};
