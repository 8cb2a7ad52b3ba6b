//! Brand domain events.

use serde::{Deserialize, Serialize};

use domain::DomainEvent;

/// Events raised by a [`Brand`](super::Brand).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BrandEvent {
    /// Brand was registered.
    BrandRegistered(BrandRegisteredData),

    /// Brand was renamed.
    BrandRenamed(BrandRenamedData),

    /// Brand website was set, changed or cleared.
    BrandWebsiteChanged(BrandWebsiteChangedData),

    /// Brand was deleted.
    BrandDeleted,
}

impl DomainEvent for BrandEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BrandEvent::BrandRegistered(_) => "BrandRegistered",
            BrandEvent::BrandRenamed(_) => "BrandRenamed",
            BrandEvent::BrandWebsiteChanged(_) => "BrandWebsiteChanged",
            BrandEvent::BrandDeleted => "BrandDeleted",
        }
    }
}

/// Data for BrandRegistered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRegisteredData {
    pub name: String,
    pub website: Option<String>,
}

/// Data for BrandRenamed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRenamedData {
    pub from: String,
    pub to: String,
}

/// Data for BrandWebsiteChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandWebsiteChangedData {
    pub website: Option<String>,
}
