//! Attribute request handlers.

use async_trait::async_trait;
use common::AggregateId;
use domain::{Aggregate, UnitOfWorkFactory};
use pipeline::{PipelineError, RequestContext, RequestHandler};

use super::requests::{AttributeView, CreateAttribute, DeleteAttribute, GetAttributes};
use super::Attribute;

pub struct GetAttributesHandler {
    uow: UnitOfWorkFactory,
}

impl GetAttributesHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<GetAttributes> for GetAttributesHandler {
    #[tracing::instrument(skip_all)]
    async fn handle(
        &self,
        _request: &GetAttributes,
        ctx: &RequestContext,
    ) -> Result<Vec<AttributeView>, PipelineError> {
        let uow = ctx.begin_unit_of_work(&self.uow);
        let mut views: Vec<AttributeView> = uow
            .list::<Attribute>()
            .await?
            .iter()
            .map(AttributeView::from)
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }
}

pub struct CreateAttributeHandler {
    uow: UnitOfWorkFactory,
}

impl CreateAttributeHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<CreateAttribute> for CreateAttributeHandler {
    #[tracing::instrument(skip(self, ctx), fields(name = %request.name))]
    async fn handle(
        &self,
        request: &CreateAttribute,
        ctx: &RequestContext,
    ) -> Result<AggregateId, PipelineError> {
        let mut attribute = Attribute::create(request.name.trim());
        let id = attribute.id();

        let mut uow = ctx.begin_unit_of_work(&self.uow);
        uow.add(&mut attribute)?;
        uow.commit().await?;

        tracing::info!(%id, "attribute created");
        Ok(id)
    }
}

pub struct DeleteAttributeHandler {
    uow: UnitOfWorkFactory,
}

impl DeleteAttributeHandler {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl RequestHandler<DeleteAttribute> for DeleteAttributeHandler {
    #[tracing::instrument(skip(self, ctx))]
    async fn handle(&self, request: &DeleteAttribute, ctx: &RequestContext) -> Result<(), PipelineError> {
        let mut uow = ctx.begin_unit_of_work(&self.uow);
        let mut attribute: Attribute = uow
            .load(request.id)
            .await?
            .ok_or_else(|| PipelineError::not_found("Attribute", request.id))?;

        attribute.delete();
        uow.remove(&mut attribute)?;
        uow.commit().await?;
        Ok(())
    }
}
