//! Request handler trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::request::Request;

/// Executes one request type.
///
/// Handlers that write open a unit of work through
/// [`RequestContext::begin_unit_of_work`] and commit it before returning.
/// A handler never touches the cache.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    async fn handle(&self, request: &R, ctx: &RequestContext) -> Result<R::Response, PipelineError>;
}

#[async_trait]
impl<R: Request, T: RequestHandler<R> + ?Sized> RequestHandler<R> for Arc<T> {
    async fn handle(&self, request: &R, ctx: &RequestContext) -> Result<R::Response, PipelineError> {
        (**self).handle(request, ctx).await
    }
}
