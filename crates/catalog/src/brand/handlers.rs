//! Brand request handlers.

use async_trait::async_trait;
use common::AggregateId;
use domain::{Aggregate, UnitOfWorkFactory};
use pipeline::{PipelineError, RequestContext, RequestHandler};

use super::Brand;
use super::requests::{
    BrandPage, BrandView, CreateBrand, DeleteBrand, GetBrand, ListBrands, UpdateBrand,
};

/// Normalises an optional website: trims it and treats blank as absent.
fn normalise_website(website: Option<&str>) -> Option<String> {
    website
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
}

pub struct GetBrandHandler {
    uow: UnitOfWorkFactory,
}

impl GetBrandHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<GetBrand> for GetBrandHandler {
    #[tracing::instrument(skip(self, ctx))]
    async fn handle(&self, request: &GetBrand, ctx: &RequestContext) -> Result<BrandView, PipelineError> {
        let uow = ctx.begin_unit_of_work(&self.uow);
        let brand: Brand = uow
            .load(request.id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Brand", request.id))?;
        Ok(BrandView::from(&brand))
    }
}

pub struct ListBrandsHandler {
    uow: UnitOfWorkFactory,
}

impl ListBrandsHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<ListBrands> for ListBrandsHandler {
    #[tracing::instrument(skip(self, ctx))]
    async fn handle(&self, request: &ListBrands, ctx: &RequestContext) -> Result<BrandPage, PipelineError> {
        let uow = ctx.begin_unit_of_work(&self.uow);
        let mut brands = uow.list::<Brand>().await?;
        brands.sort_by(|a, b| a.name().cmp(b.name()));

        let total = brands.len();
        let skip = (request.page.saturating_sub(1) as usize).saturating_mul(request.page_size as usize);
        let items = brands
            .iter()
            .skip(skip)
            .take(request.page_size as usize)
            .map(BrandView::from)
            .collect();

        Ok(BrandPage {
            items,
            page: request.page,
            page_size: request.page_size,
            total,
        })
    }
}

pub struct CreateBrandHandler {
    uow: UnitOfWorkFactory,
}

impl CreateBrandHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<CreateBrand> for CreateBrandHandler {
    #[tracing::instrument(skip(self, ctx), fields(name = %request.name))]
    async fn handle(&self, request: &CreateBrand, ctx: &RequestContext) -> Result<AggregateId, PipelineError> {
        let mut brand = Brand::register(
            request.name.trim(),
            normalise_website(request.website.as_deref()),
        );
        let id = brand.id();

        let mut uow = ctx.begin_unit_of_work(&self.uow);
        uow.add(&mut brand)?;
        uow.commit().await?;

        tracing::info!(%id, "brand registered");
        Ok(id)
    }
}

pub struct UpdateBrandHandler {
    uow: UnitOfWorkFactory,
}

impl UpdateBrandHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<UpdateBrand> for UpdateBrandHandler {
    #[tracing::instrument(skip(self, ctx), fields(id = %request.id))]
    async fn handle(&self, request: &UpdateBrand, ctx: &RequestContext) -> Result<BrandView, PipelineError> {
        let mut uow = ctx.begin_unit_of_work(&self.uow);
        let mut brand: Brand = uow
            .load(request.id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Brand", request.id))?;

        let renamed = brand.rename(request.name.trim());
        let relinked = brand.change_website(normalise_website(request.website.as_deref()));
        if !renamed && !relinked {
            tracing::debug!("brand unchanged");
            return Ok(BrandView::from(&brand));
        }

        uow.update(&mut brand)?;
        let receipt = uow.commit().await?;
        if !receipt.fully_published() {
            tracing::warn!(
                failed = receipt.publish_failures.len(),
                "brand updated but some events were not delivered"
            );
        }
        Ok(BrandView::from(&brand))
    }
}

pub struct DeleteBrandHandler {
    uow: UnitOfWorkFactory,
}

impl DeleteBrandHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<DeleteBrand> for DeleteBrandHandler {
    #[tracing::instrument(skip(self, ctx))]
    async fn handle(&self, request: &DeleteBrand, ctx: &RequestContext) -> Result<(), PipelineError> {
        let mut uow = ctx.begin_unit_of_work(&self.uow);
        let mut brand: Brand = uow
            .load(request.id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Brand", request.id))?;

        brand.delete();
        uow.remove(&mut brand)?;
        uow.commit().await?;
        Ok(())
    }
}
