//! Brand requests and their validators.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::Aggregate;
use pipeline::{Cacheable, Invalidating, Request, ValidationErrors, ValidationFailure, rules};
use serde::{Deserialize, Serialize};

use super::Brand;
use crate::keys::{BRAND_LIST_PREFIX, CatalogKey};

pub const BRAND_NAME_MAX: usize = 128;
pub const WEBSITE_MAX: usize = 256;
pub const PAGE_SIZE_MAX: u32 = 100;

/// Read model returned by brand queries and commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandView {
    pub id: AggregateId,
    pub name: String,
    pub website: Option<String>,
    pub version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl From<&Brand> for BrandView {
    fn from(brand: &Brand) -> Self {
        let audit = brand.audit();
        Self {
            id: brand.id(),
            name: brand.name().to_string(),
            website: brand.website().map(str::to_string),
            version: brand.version().as_i64(),
            created_at: audit.created_at,
            created_by: audit.created_by.clone(),
            updated_at: audit.updated_at,
            updated_by: audit.updated_by.clone(),
        }
    }
}

/// One page of brands ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandPage {
    pub items: Vec<BrandView>,
    pub page: u32,
    pub page_size: u32,
    pub total: usize,
}

/// Fetches one brand. Cached under `brand_detail_{id}`.
#[derive(Debug, Clone, Copy)]
pub struct GetBrand {
    pub id: AggregateId,
}

impl Request for GetBrand {
    type Response = BrandView;

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        Some(self)
    }

    fn response_tag() -> Cow<'static, str> {
        Cow::Borrowed("brand_view.v1")
    }
}

impl Cacheable for GetBrand {
    fn cache_key(&self) -> String {
        CatalogKey::BrandDetail(self.id).to_string()
    }
}

/// Lists brands a page at a time. Pages are numbered from 1.
#[derive(Debug, Clone, Copy)]
pub struct ListBrands {
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListBrands {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Request for ListBrands {
    type Response = BrandPage;

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        Some(self)
    }

    fn response_tag() -> Cow<'static, str> {
        Cow::Borrowed("brand_page.v1")
    }
}

impl Cacheable for ListBrands {
    fn cache_key(&self) -> String {
        CatalogKey::BrandList {
            page: self.page,
            page_size: self.page_size,
        }
        .to_string()
    }
}

pub fn validate_list_brands(request: &ListBrands, errors: &mut ValidationErrors) {
    errors
        .check(rules::in_range("page", request.page, 1, u32::MAX))
        .check(rules::in_range("page_size", request.page_size, 1, PAGE_SIZE_MAX));
}

/// Registers a brand and returns its id.
#[derive(Debug, Clone)]
pub struct CreateBrand {
    pub name: String,
    pub website: Option<String>,
}

impl CreateBrand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website: None,
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }
}

impl Request for CreateBrand {
    type Response = AggregateId;

    fn as_invalidating(&self) -> Option<&dyn Invalidating> {
        Some(self)
    }
}

impl Invalidating for CreateBrand {
    fn invalidated_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn invalidated_prefixes(&self) -> Vec<String> {
        vec![BRAND_LIST_PREFIX.to_string()]
    }
}

pub fn validate_create_brand(request: &CreateBrand, errors: &mut ValidationErrors) {
    check_name(&request.name, errors);
    check_website(request.website.as_deref(), errors);
}

/// Replaces a brand's name and website and returns the updated view.
#[derive(Debug, Clone)]
pub struct UpdateBrand {
    pub id: AggregateId,
    pub name: String,
    pub website: Option<String>,
}

impl UpdateBrand {
    pub fn new(id: AggregateId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            website: None,
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }
}

impl Request for UpdateBrand {
    type Response = BrandView;

    fn as_invalidating(&self) -> Option<&dyn Invalidating> {
        Some(self)
    }
}

impl Invalidating for UpdateBrand {
    fn invalidated_keys(&self) -> Vec<String> {
        vec![CatalogKey::BrandDetail(self.id).to_string()]
    }

    fn invalidated_prefixes(&self) -> Vec<String> {
        vec![BRAND_LIST_PREFIX.to_string()]
    }
}

pub fn validate_update_brand(request: &UpdateBrand, errors: &mut ValidationErrors) {
    errors.check(rules::not_nil_id("id", request.id));
    check_name(&request.name, errors);
    check_website(request.website.as_deref(), errors);
}

/// Soft-deletes a brand.
#[derive(Debug, Clone, Copy)]
pub struct DeleteBrand {
    pub id: AggregateId,
}

impl Request for DeleteBrand {
    type Response = ();

    fn as_invalidating(&self) -> Option<&dyn Invalidating> {
        Some(self)
    }
}

impl Invalidating for DeleteBrand {
    fn invalidated_keys(&self) -> Vec<String> {
        vec![CatalogKey::BrandDetail(self.id).to_string()]
    }

    fn invalidated_prefixes(&self) -> Vec<String> {
        vec![BRAND_LIST_PREFIX.to_string()]
    }
}

fn check_name(name: &str, errors: &mut ValidationErrors) {
    errors
        .check(rules::not_blank("name", name))
        .check(rules::max_length("name", name, BRAND_NAME_MAX));
}

fn check_website(website: Option<&str>, errors: &mut ValidationErrors) {
    let Some(website) = website else {
        return;
    };
    errors.check(rules::max_length("website", website, WEBSITE_MAX));
    if !(website.starts_with("https://") || website.starts_with("http://")) {
        errors.check(Err(ValidationFailure::new(
            "website",
            "must be an http or https URL",
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_brand_invalidates_its_detail_and_every_list_page() {
        let id = AggregateId::new();
        let update = UpdateBrand::new(id, "Acme");
        let invalidating = update.as_invalidating().unwrap();
        assert_eq!(
            invalidating.invalidated_keys(),
            vec![format!("brand_detail_{id}")]
        );
        assert_eq!(invalidating.invalidated_prefixes(), vec!["brand_list_"]);
    }

    #[test]
    fn update_brand_reports_every_failure() {
        let request = UpdateBrand::new(AggregateId::nil(), " ").with_website("ftp://acme");
        let mut errors = ValidationErrors::new();
        validate_update_brand(&request, &mut errors);

        let fields: Vec<&str> = errors.failures().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "name", "website"]);
    }

    #[test]
    fn list_page_size_is_bounded() {
        let mut errors = ValidationErrors::new();
        validate_list_brands(
            &ListBrands {
                page: 0,
                page_size: PAGE_SIZE_MAX + 1,
            },
            &mut errors,
        );
        assert_eq!(errors.len(), 2);
    }
}
