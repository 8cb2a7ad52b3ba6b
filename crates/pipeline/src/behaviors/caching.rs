use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cache::CacheStore;
use serde::{Deserialize, Serialize};

use crate::behavior::{Behavior, Next};
use crate::config::Environment;
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::request::{Request, short_type_name};

/// Stored form of a cached response. The tag (see [`Request::response_tag`])
/// lets a reader detect an entry written for a different response type
/// under the same key.
#[derive(Serialize, Deserialize)]
struct CachedResponse {
    tag: String,
    payload: serde_json::Value,
}

enum Lookup<T> {
    Hit(T),
    Miss,
    Mismatch { found: String },
}

/// Serves cacheable requests from the cache store and populates it on a miss.
///
/// Cache store failures never fail the request; the handler simply runs.
pub struct CachingBehavior {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    environment: Environment,
}

impl CachingBehavior {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration, environment: Environment) -> Self {
        Self {
            store,
            default_ttl,
            environment,
        }
    }

    async fn lookup<T: serde::de::DeserializeOwned>(&self, key: &str, expected: &str) -> Lookup<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Lookup::Miss,
            Err(err) => {
                tracing::warn!(cache_key = key, error = %err, "cache read failed, treating as miss");
                return Lookup::Miss;
            }
        };

        let entry: CachedResponse = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(_) => {
                return Lookup::Mismatch {
                    found: "undecodable entry".to_string(),
                };
            }
        };
        if entry.tag != expected {
            return Lookup::Mismatch { found: entry.tag };
        }
        match serde_json::from_value(entry.payload) {
            Ok(value) => Lookup::Hit(value),
            Err(err) => Lookup::Mismatch {
                found: format!("{} with incompatible shape ({err})", entry.tag),
            },
        }
    }

    async fn populate<T: Serialize>(&self, key: &str, tag: &str, value: &T, ttl: Duration) {
        let entry = serde_json::to_value(value).and_then(|payload| {
            serde_json::to_vec(&CachedResponse {
                tag: tag.to_string(),
                payload,
            })
        });
        let bytes = match entry {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(cache_key = key, error = %err, "response not cacheable");
                return;
            }
        };
        if let Err(err) = self.store.set(key, bytes, Some(ttl)).await {
            tracing::warn!(cache_key = key, error = %err, "cache write failed");
        }
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for CachingBehavior {
    async fn handle(
        &self,
        request: &R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> Result<R::Response, PipelineError> {
        let Some(cacheable) = request.as_cacheable() else {
            return next.run(request, ctx).await;
        };
        let key = cacheable.cache_key();
        if key.is_empty() {
            return next.run(request, ctx).await;
        }
        let request_type = short_type_name::<R>();
        let tag = R::response_tag();

        match self.lookup::<R::Response>(&key, &tag).await {
            Lookup::Hit(response) => {
                metrics::counter!("pipeline_cache_hits_total", "request_type" => request_type)
                    .increment(1);
                tracing::debug!(cache_key = %key, "cache hit");
                return Ok(response);
            }
            Lookup::Miss => {}
            Lookup::Mismatch { found } => {
                if !self.environment.is_production() {
                    tracing::error!(cache_key = %key, expected = %tag, %found, "cached entry has the wrong type");
                    return Err(PipelineError::CacheTypeMismatch {
                        key,
                        expected: tag.into_owned(),
                        found,
                    });
                }
                tracing::warn!(
                    cache_key = %key,
                    expected = %tag,
                    %found,
                    "cached entry has the wrong type, repopulating"
                );
            }
        }

        metrics::counter!("pipeline_cache_misses_total", "request_type" => request_type)
            .increment(1);
        tracing::debug!(cache_key = %key, "cache miss");

        let response = next.run(request, ctx).await?;
        let ttl = cacheable.sliding_ttl().unwrap_or(self.default_ttl);
        self.populate(&key, &tag, &response, ttl).await;
        Ok(response)
    }
}
