use std::sync::Arc;

use async_trait::async_trait;

use crate::behavior::{Behavior, Next};
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::request::Request;
use crate::validation::{ValidationErrors, Validator};

/// Runs every registered validator and fails with all their failures at once.
pub struct ValidationBehavior<R> {
    validators: Vec<Arc<dyn Validator<R>>>,
}

impl<R> ValidationBehavior<R> {
    pub fn new(validators: Vec<Arc<dyn Validator<R>>>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for ValidationBehavior<R> {
    async fn handle(
        &self,
        request: &R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> Result<R::Response, PipelineError> {
        let mut errors = ValidationErrors::new();
        for validator in &self.validators {
            validator.validate(request, &mut errors);
        }

        if !errors.is_empty() {
            tracing::debug!(failures = errors.len(), "request failed validation");
            return Err(PipelineError::Validation(errors));
        }

        next.run(request, ctx).await
    }
}
