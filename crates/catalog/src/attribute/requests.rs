//! Attribute requests and their validators.

use std::borrow::Cow;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::Aggregate;
use pipeline::{Cacheable, Invalidating, Request, ValidationErrors, rules};
use serde::{Deserialize, Serialize};

use super::Attribute;
use crate::keys::CatalogKey;

pub const ATTRIBUTE_NAME_MAX: usize = 64;

/// Read model returned by attribute queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeView {
    pub id: AggregateId,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

impl From<&Attribute> for AttributeView {
    fn from(attribute: &Attribute) -> Self {
        Self {
            id: attribute.id(),
            name: attribute.name().to_string(),
            created_at: attribute.audit().created_at,
            created_by: attribute.audit().created_by.clone(),
        }
    }
}

/// Lists every live attribute, ordered by name. Cached for an hour of idleness.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetAttributes;

impl Request for GetAttributes {
    type Response = Vec<AttributeView>;

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        Some(self)
    }

    fn response_tag() -> Cow<'static, str> {
        Cow::Borrowed("attribute_list.v1")
    }
}

impl Cacheable for GetAttributes {
    fn cache_key(&self) -> String {
        CatalogKey::AttributesAll.to_string()
    }

    fn sliding_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(60 * 60))
    }
}

/// Creates an attribute and returns its id.
#[derive(Debug, Clone)]
pub struct CreateAttribute {
    pub name: String,
}

impl CreateAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Request for CreateAttribute {
    type Response = AggregateId;

    fn as_invalidating(&self) -> Option<&dyn Invalidating> {
        Some(self)
    }
}

impl Invalidating for CreateAttribute {
    fn invalidated_keys(&self) -> Vec<String> {
        vec![CatalogKey::AttributesAll.to_string()]
    }
}

pub fn validate_create_attribute(request: &CreateAttribute, errors: &mut ValidationErrors) {
    errors
        .check(rules::not_blank("name", &request.name))
        .check(rules::max_length("name", &request.name, ATTRIBUTE_NAME_MAX));
}

/// Soft-deletes an attribute.
#[derive(Debug, Clone, Copy)]
pub struct DeleteAttribute {
    pub id: AggregateId,
}

impl Request for DeleteAttribute {
    type Response = ();

    fn as_invalidating(&self) -> Option<&dyn Invalidating> {
        Some(self)
    }
}

impl Invalidating for DeleteAttribute {
    fn invalidated_keys(&self) -> Vec<String> {
        vec![CatalogKey::AttributesAll.to_string()]
    }
}
