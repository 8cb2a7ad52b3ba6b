//! Integration tests for the caching and invalidation behaviors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cache::{CacheError, CacheStore, InMemoryCacheStore};
use pipeline::{
    Cacheable, Environment, Invalidating, Mediator, PipelineConfig, PipelineError, Request,
    RequestContext, RequestHandler,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tags(Vec<String>);

/// Cacheable query. `ttl` overrides the configured default.
struct ListTags {
    key: &'static str,
    ttl: Option<Duration>,
}

impl Request for ListTags {
    type Response = Tags;

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        Some(self)
    }
}

impl Cacheable for ListTags {
    fn cache_key(&self) -> String {
        self.key.to_string()
    }

    fn sliding_ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

/// Cacheable query sharing a key with [`ListTags`] but answering a different type.
struct CountTags;

impl Request for CountTags {
    type Response = usize;

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        Some(self)
    }
}

impl Cacheable for CountTags {
    fn cache_key(&self) -> String {
        "tags_all".to_string()
    }
}

/// Invalidating command. Fails when `fail` is set.
struct AddTag {
    name: String,
    fail: bool,
}

impl Request for AddTag {
    type Response = ();

    fn as_invalidating(&self) -> Option<&dyn Invalidating> {
        Some(self)
    }
}

impl Invalidating for AddTag {
    fn invalidated_keys(&self) -> Vec<String> {
        vec!["tags_all".to_string(), "never_cached".to_string()]
    }

    fn invalidated_prefixes(&self) -> Vec<String> {
        vec!["tag_detail_".to_string()]
    }
}

#[derive(Default)]
struct TagBook {
    tags: std::sync::Mutex<Vec<String>>,
    reads: AtomicUsize,
}

impl TagBook {
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestHandler<ListTags> for TagBook {
    async fn handle(&self, _: &ListTags, _: &RequestContext) -> Result<Tags, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let tags = self.tags.lock().unwrap().clone();
        Ok(Tags(tags))
    }
}

#[async_trait]
impl RequestHandler<CountTags> for TagBook {
    async fn handle(&self, _: &CountTags, _: &RequestContext) -> Result<usize, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.tags.lock().unwrap().len())
    }
}

#[async_trait]
impl RequestHandler<AddTag> for TagBook {
    async fn handle(&self, request: &AddTag, _: &RequestContext) -> Result<(), PipelineError> {
        if request.fail {
            return Err(PipelineError::handler("tag store offline"));
        }
        self.tags.lock().unwrap().push(request.name.clone());
        Ok(())
    }
}

/// Cache store whose operations can be switched to fail.
#[derive(Clone, Default)]
struct BrokenCache {
    inner: InMemoryCacheStore,
    broken: Arc<AtomicBool>,
}

impl BrokenCache {
    fn check(&self) -> cache::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, key: &str) -> cache::Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> cache::Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> cache::Result<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_by_prefix(&self, prefix: &str) -> cache::Result<usize> {
        self.check()?;
        self.inner.delete_by_prefix(prefix).await
    }
}

fn mediator(book: Arc<TagBook>, cache: Arc<dyn CacheStore>, config: PipelineConfig) -> Mediator {
    Mediator::builder()
        .handler::<ListTags, _>(book.clone())
        .handler::<CountTags, _>(book.clone())
        .handler::<AddTag, _>(book)
        .cache_store(cache)
        .config(config)
        .build()
        .unwrap()
}

fn list_all() -> ListTags {
    ListTags {
        key: "tags_all",
        ttl: Some(Duration::from_secs(3600)),
    }
}

fn add(name: &str) -> AddTag {
    AddTag {
        name: name.to_string(),
        fail: false,
    }
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn second_identical_query_is_served_from_cache() {
        let book = Arc::new(TagBook::default());
        let cache = InMemoryCacheStore::new();
        let mediator = mediator(book.clone(), Arc::new(cache.clone()), PipelineConfig::default());

        let first = mediator.send(list_all()).await.unwrap();
        let second = mediator.send(list_all()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(book.reads(), 1);
        assert!(cache.contains("tags_all").await);
    }

    #[tokio::test]
    async fn empty_key_bypasses_the_cache() {
        let book = Arc::new(TagBook::default());
        let cache = InMemoryCacheStore::new();
        let mediator = mediator(book.clone(), Arc::new(cache.clone()), PipelineConfig::default());
        let uncached = || ListTags { key: "", ttl: None };

        mediator.send(uncached()).await.unwrap();
        mediator.send(uncached()).await.unwrap();

        assert_eq!(book.reads(), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_idling_past_the_sliding_ttl() {
        let book = Arc::new(TagBook::default());
        let mediator = mediator(
            book.clone(),
            Arc::new(InMemoryCacheStore::new()),
            PipelineConfig::default(),
        );
        let query = || ListTags {
            key: "tags_short",
            ttl: Some(Duration::from_secs(10)),
        };

        mediator.send(query()).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        mediator.send(query()).await.unwrap();
        // Read at 8s restarted the idle clock
        tokio::time::advance(Duration::from_secs(8)).await;
        mediator.send(query()).await.unwrap();
        assert_eq!(book.reads(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        mediator.send(query()).await.unwrap();
        assert_eq!(book.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_default_ttl_applies_when_none_is_declared() {
        let book = Arc::new(TagBook::default());
        let config = PipelineConfig::default().with_cache_default_ttl(Duration::from_secs(5));
        let mediator = mediator(book.clone(), Arc::new(InMemoryCacheStore::new()), config);
        let query = || ListTags {
            key: "tags_default",
            ttl: None,
        };

        mediator.send(query()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        mediator.send(query()).await.unwrap();

        assert_eq!(book.reads(), 2);
    }

    #[tokio::test]
    async fn type_mismatch_fails_loudly_outside_production() {
        let book = Arc::new(TagBook::default());
        let mediator = mediator(
            book.clone(),
            Arc::new(InMemoryCacheStore::new()),
            PipelineConfig::default(),
        );

        mediator.send(list_all()).await.unwrap();
        let err = mediator.send(CountTags).await.unwrap_err();

        match err {
            PipelineError::CacheTypeMismatch { key, expected, found } => {
                assert_eq!(key, "tags_all");
                assert_eq!(expected, "usize");
                assert_eq!(found, "Tags");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(book.reads(), 1);
    }

    #[tokio::test]
    async fn entries_are_matched_by_tag_not_by_module_path() {
        let book = Arc::new(TagBook::default());
        let cache = InMemoryCacheStore::new();
        // Written by another build of the service: only the tag is shared.
        let entry = serde_json::json!({ "tag": "Tags", "payload": ["blue"] });
        cache
            .set("tags_all", serde_json::to_vec(&entry).unwrap(), None)
            .await
            .unwrap();
        let mediator = mediator(book.clone(), Arc::new(cache), PipelineConfig::default());

        let tags = mediator.send(list_all()).await.unwrap();

        assert_eq!(tags, Tags(vec!["blue".into()]));
        assert_eq!(book.reads(), 0);
    }

    #[tokio::test]
    async fn type_mismatch_falls_through_and_repopulates_in_production() {
        let book = Arc::new(TagBook::default());
        let config = PipelineConfig::default().with_environment(Environment::Production);
        let mediator = mediator(book.clone(), Arc::new(InMemoryCacheStore::new()), config);

        mediator.send(add("red")).await.unwrap();
        mediator.send(list_all()).await.unwrap();
        assert_eq!(mediator.send(CountTags).await.unwrap(), 1);
        assert_eq!(mediator.send(CountTags).await.unwrap(), 1);

        // list, count miss; second count hits the repopulated entry
        assert_eq!(book.reads(), 2);
    }

    #[tokio::test]
    async fn handler_errors_are_not_cached() {
        struct Flaky {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl RequestHandler<ListTags> for Flaky {
            async fn handle(&self, _: &ListTags, _: &RequestContext) -> Result<Tags, PipelineError> {
                match self.calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(PipelineError::handler("warming up")),
                    _ => Ok(Tags(vec!["ok".into()])),
                }
            }
        }

        let mediator = Mediator::builder()
            .handler::<ListTags, _>(Flaky {
                calls: AtomicUsize::new(0),
            })
            .build()
            .unwrap();

        assert!(mediator.send(list_all()).await.is_err());
        assert_eq!(
            mediator.send(list_all()).await.unwrap(),
            Tags(vec!["ok".into()])
        );
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_the_handler() {
        let book = Arc::new(TagBook::default());
        let cache = BrokenCache::default();
        cache.broken.store(true, Ordering::SeqCst);
        let mediator = mediator(book.clone(), Arc::new(cache), PipelineConfig::default());

        mediator.send(list_all()).await.unwrap();
        mediator.send(list_all()).await.unwrap();

        assert_eq!(book.reads(), 2);
    }
}

mod invalidation {
    use super::*;

    #[tokio::test]
    async fn successful_command_removes_keys_and_prefixed_entries() {
        let book = Arc::new(TagBook::default());
        let cache = InMemoryCacheStore::new();
        let mediator = mediator(book.clone(), Arc::new(cache.clone()), PipelineConfig::default());
        cache.set("tag_detail_1", b"{}".to_vec(), None).await.unwrap();
        cache.set("tag_detail_2", b"{}".to_vec(), None).await.unwrap();
        cache.set("unrelated", b"{}".to_vec(), None).await.unwrap();

        let before = mediator.send(list_all()).await.unwrap();
        mediator.send(add("Color")).await.unwrap();

        assert!(!cache.contains("tags_all").await);
        assert!(!cache.contains("tag_detail_1").await);
        assert!(!cache.contains("tag_detail_2").await);
        assert!(cache.contains("unrelated").await);

        let after = mediator.send(list_all()).await.unwrap();
        assert_eq!(before, Tags(vec![]));
        assert_eq!(after, Tags(vec!["Color".to_string()]));
        assert_eq!(book.reads(), 2);
    }

    #[tokio::test]
    async fn failed_command_leaves_the_cache_untouched() {
        let book = Arc::new(TagBook::default());
        let cache = InMemoryCacheStore::new();
        let mediator = mediator(book.clone(), Arc::new(cache.clone()), PipelineConfig::default());
        cache.set("tag_detail_9", b"{}".to_vec(), None).await.unwrap();
        mediator.send(list_all()).await.unwrap();

        let err = mediator
            .send(AddTag {
                name: "Size".into(),
                fail: true,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Handler(_)));
        assert!(cache.contains("tags_all").await);
        assert!(cache.contains("tag_detail_9").await);
    }

    #[tokio::test]
    async fn cache_outage_during_invalidation_does_not_fail_the_command() {
        let book = Arc::new(TagBook::default());
        let cache = BrokenCache::default();
        let mediator = mediator(book.clone(), Arc::new(cache.clone()), PipelineConfig::default());

        cache.broken.store(true, Ordering::SeqCst);
        mediator.send(add("Weight")).await.unwrap();

        assert_eq!(*book.tags.lock().unwrap(), vec!["Weight".to_string()]);
    }
}
