//! Brand aggregate.

use common::AggregateId;
use domain::{Aggregate, AggregateRoot};
use serde::{Deserialize, Serialize};

use super::events::{BrandEvent, BrandRegisteredData, BrandRenamedData, BrandWebsiteChangedData};

/// A product brand.
///
/// Each business method raises at most one event and does nothing when the
/// requested value equals the current one.
#[derive(Debug, Serialize, Deserialize)]
pub struct Brand {
    #[serde(flatten)]
    root: AggregateRoot<BrandEvent>,

    name: String,

    #[serde(default)]
    website: Option<String>,
}

impl Aggregate for Brand {
    type Event = BrandEvent;

    fn aggregate_type() -> &'static str {
        "Brand"
    }

    fn root(&self) -> &AggregateRoot<BrandEvent> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<BrandEvent> {
        &mut self.root
    }
}

impl Brand {
    pub fn register(name: impl Into<String>, website: Option<String>) -> Self {
        let name = name.into();
        let mut brand = Self {
            root: AggregateRoot::new(AggregateId::new()),
            name: name.clone(),
            website: website.clone(),
        };
        brand
            .root
            .record(BrandEvent::BrandRegistered(BrandRegisteredData {
                name,
                website,
            }));
        brand
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn website(&self) -> Option<&str> {
        self.website.as_deref()
    }

    /// Returns true if the name changed.
    pub fn rename(&mut self, name: &str) -> bool {
        if self.name == name {
            return false;
        }
        let from = std::mem::replace(&mut self.name, name.to_string());
        self.root.record(BrandEvent::BrandRenamed(BrandRenamedData {
            from,
            to: name.to_string(),
        }));
        true
    }

    /// Returns true if the website changed.
    pub fn change_website(&mut self, website: Option<String>) -> bool {
        if self.website == website {
            return false;
        }
        self.website = website.clone();
        self.root
            .record(BrandEvent::BrandWebsiteChanged(BrandWebsiteChangedData {
                website,
            }));
        true
    }

    pub fn delete(&mut self) {
        self.root.record(BrandEvent::BrandDeleted);
    }
}
