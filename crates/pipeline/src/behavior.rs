//! Behaviors wrap the handler; [`Next`] hands control to the rest of the chain.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::handler::RequestHandler;
use crate::request::Request;

/// A stage that runs around the handler.
///
/// A behavior either calls `next.run(..)` or short-circuits with its own
/// result.
#[async_trait]
pub trait Behavior<R: Request>: Send + Sync {
    async fn handle(
        &self,
        request: &R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> Result<R::Response, PipelineError>;
}

/// The remainder of a behavior chain.
pub struct Next<'a, R: Request> {
    behaviors: &'a [Arc<dyn Behavior<R>>],
    handler: &'a dyn RequestHandler<R>,
}

impl<'a, R: Request> Next<'a, R> {
    pub(crate) fn new(
        behaviors: &'a [Arc<dyn Behavior<R>>],
        handler: &'a dyn RequestHandler<R>,
    ) -> Self {
        Self { behaviors, handler }
    }

    /// Runs the next stage. Fails with `Cancelled` if the request was
    /// cancelled before the stage started.
    pub async fn run(self, request: &R, ctx: &RequestContext) -> Result<R::Response, PipelineError> {
        ctx.ensure_active()?;
        match self.behaviors.split_first() {
            Some((behavior, rest)) => {
                behavior
                    .handle(request, ctx, Next::new(rest, self.handler))
                    .await
            }
            None => self.handler.handle(request, ctx).await,
        }
    }
}
