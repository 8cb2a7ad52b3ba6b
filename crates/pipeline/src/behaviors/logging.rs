use std::time::Instant;

use async_trait::async_trait;
use tracing::Instrument;

use crate::behavior::{Behavior, Next};
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::request::{Request, short_type_name};

/// Outermost behavior: opens the request span, logs the outcome and
/// records request metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBehavior;

#[async_trait]
impl<R: Request> Behavior<R> for LoggingBehavior {
    async fn handle(
        &self,
        request: &R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> Result<R::Response, PipelineError> {
        let request_type = short_type_name::<R>();
        let span = tracing::info_span!(
            "request",
            request_type,
            request_id = %ctx.request_id(),
            actor = %ctx.current_user().actor(),
        );

        async move {
            let started = Instant::now();
            tracing::debug!("handling request");

            let result = next.run(request, ctx).await;

            let elapsed = started.elapsed();
            let outcome = match &result {
                Ok(_) => {
                    tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "request handled");
                    "ok"
                }
                Err(err) if err.is_client_error() => {
                    tracing::info!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %err,
                        "request rejected"
                    );
                    err.kind()
                }
                Err(err) => {
                    tracing::error!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %err,
                        "request failed"
                    );
                    err.kind()
                }
            };

            metrics::counter!(
                "pipeline_requests_total",
                "request_type" => request_type,
                "outcome" => outcome
            )
            .increment(1);
            metrics::histogram!("pipeline_request_duration_seconds", "request_type" => request_type)
                .record(elapsed.as_secs_f64());

            result
        }
        .instrument(span)
        .await
    }
}
