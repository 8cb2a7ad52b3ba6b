//! Cache keys used by catalog queries and invalidated by catalog commands.

use std::fmt;

use common::AggregateId;

/// Prefix shared by every page of the brand list.
pub const BRAND_LIST_PREFIX: &str = "brand_list_";

/// A cache entry owned by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKey {
    /// Every live attribute.
    AttributesAll,
    /// One brand's detail view.
    BrandDetail(AggregateId),
    /// One page of the brand list.
    BrandList { page: u32, page_size: u32 },
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKey::AttributesAll => f.write_str("attributes_all"),
            CatalogKey::BrandDetail(id) => write!(f, "brand_detail_{id}"),
            CatalogKey::BrandList { page, page_size } => {
                write!(f, "{BRAND_LIST_PREFIX}{page}_{page_size}")
            }
        }
    }
}
