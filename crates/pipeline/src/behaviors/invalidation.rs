use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cache::CacheStore;
use domain::CommitHook;

use crate::behavior::{Behavior, Next};
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::request::{Request, short_type_name};

/// Deletes the cache entries a command declares stale, after it succeeds.
///
/// The deletes are registered as a commit hook on every unit of work the
/// handler begins, so they run on the commit task and still happen when
/// the caller drops the request after the commit. Handlers that succeed
/// without committing get the deletes when they return. Nothing is
/// deleted when the handler fails before committing. A failed delete is
/// logged and counted; the committed write still succeeds.
pub struct InvalidationBehavior {
    store: Arc<dyn CacheStore>,
}

impl InvalidationBehavior {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}

/// The stale keys and prefixes of one command.
struct StaleEntries {
    store: Arc<dyn CacheStore>,
    request_type: &'static str,
    keys: Vec<String>,
    prefixes: Vec<String>,
    runs: AtomicUsize,
}

impl StaleEntries {
    async fn invalidate(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let request_type = self.request_type;
        let mut removed = 0usize;

        for key in self.keys.iter().filter(|k| !k.is_empty()) {
            match self.store.delete(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    metrics::counter!("pipeline_cache_invalidation_failures_total", "request_type" => request_type)
                        .increment(1);
                    tracing::error!(cache_key = %key, error = %err, "cache invalidation failed");
                }
            }
        }

        // An empty prefix would match every key.
        for prefix in self.prefixes.iter().filter(|p| !p.is_empty()) {
            match self.store.delete_by_prefix(prefix).await {
                Ok(count) => removed += count,
                Err(err) => {
                    metrics::counter!("pipeline_cache_invalidation_failures_total", "request_type" => request_type)
                        .increment(1);
                    tracing::error!(cache_prefix = %prefix, error = %err, "cache invalidation failed");
                }
            }
        }

        metrics::counter!("pipeline_cache_invalidations_total", "request_type" => request_type)
            .increment(removed as u64);
        tracing::debug!(keys = ?self.keys, prefixes = ?self.prefixes, removed, "cache invalidated");
    }

    fn has_run(&self) -> bool {
        self.runs.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl CommitHook for StaleEntries {
    async fn committed(&self) {
        self.invalidate().await;
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for InvalidationBehavior {
    async fn handle(
        &self,
        request: &R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> Result<R::Response, PipelineError> {
        let Some(invalidating) = request.as_invalidating() else {
            return next.run(request, ctx).await;
        };
        let stale = Arc::new(StaleEntries {
            store: self.store.clone(),
            request_type: short_type_name::<R>(),
            keys: invalidating.invalidated_keys(),
            prefixes: invalidating.invalidated_prefixes(),
            runs: AtomicUsize::new(0),
        });

        let scoped = ctx.clone().with_commit_hook(stale.clone());
        let response = next.run(request, &scoped).await?;

        if !stale.has_run() {
            stale.invalidate().await;
        }
        Ok(response)
    }
}
