//! Integration tests for the unit of work.
//!
//! These tests exercise commit atomicity, event publication ordering and
//! the isolation of post-commit delivery failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Aggregate, AggregateRoot, Anonymous, CommitHook, CurrentUser, DomainEvent, EventEnvelope,
    EventPublisher, InMemoryEventPublisher, PublishError, UnitOfWorkError, UnitOfWorkFactory,
};
use entity_store::{
    EntityChange, EntityQuery, EntityRecord, EntityStore, EntityStoreExt, InMemoryEntityStore,
    StoreError, Version,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ProductEvent {
    Listed { sku: String },
    Repriced { cents: i64 },
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Listed { .. } => "ProductListed",
            ProductEvent::Repriced { .. } => "ProductRepriced",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Product {
    #[serde(flatten)]
    root: AggregateRoot<ProductEvent>,
    sku: String,
    cents: i64,
}

impl Aggregate for Product {
    type Event = ProductEvent;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn root(&self) -> &AggregateRoot<ProductEvent> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<ProductEvent> {
        &mut self.root
    }
}

impl Product {
    fn list(sku: &str, cents: i64) -> Self {
        let mut product = Product {
            root: AggregateRoot::new(AggregateId::new()),
            sku: sku.to_string(),
            cents: 0,
        };
        product.root.record(ProductEvent::Listed {
            sku: sku.to_string(),
        });
        product.reprice(cents);
        product
    }

    fn reprice(&mut self, cents: i64) {
        self.cents = cents;
        self.root.record(ProductEvent::Repriced { cents });
    }
}

/// Store wrapper whose commits can be switched to fail.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: InMemoryEntityStore,
    fail_commits: Arc<AtomicBool>,
}

impl FlakyStore {
    fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn commit(&self, changes: Vec<EntityChange>) -> entity_store::Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.commit(changes).await
    }

    async fn get(
        &self,
        entity_type: &str,
        id: AggregateId,
    ) -> entity_store::Result<Option<EntityRecord>> {
        self.inner.get(entity_type, id).await
    }

    async fn get_including_deleted(
        &self,
        entity_type: &str,
        id: AggregateId,
    ) -> entity_store::Result<Option<EntityRecord>> {
        self.inner.get_including_deleted(entity_type, id).await
    }

    async fn query(&self, query: EntityQuery) -> entity_store::Result<Vec<EntityRecord>> {
        self.inner.query(query).await
    }

    async fn version_of(
        &self,
        entity_type: &str,
        id: AggregateId,
    ) -> entity_store::Result<Option<Version>> {
        self.inner.version_of(entity_type, id).await
    }
}

/// Publisher that rejects one event type and records the rest.
struct SelectivePublisher {
    inner: InMemoryEventPublisher,
    reject: &'static str,
}

#[async_trait]
impl EventPublisher for SelectivePublisher {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError> {
        if event.event_type == self.reject {
            return Err(PublishError::Unavailable("broker offline".into()));
        }
        self.inner.publish(event).await
    }
}

/// Publisher that requests cancellation the first time it is called.
struct CancellingPublisher {
    inner: InMemoryEventPublisher,
    token: CancellationToken,
}

#[async_trait]
impl EventPublisher for CancellingPublisher {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError> {
        self.token.cancel();
        self.inner.publish(event).await
    }
}

/// Publisher that takes `delay` to deliver each event.
struct SlowPublisher {
    inner: InMemoryEventPublisher,
    delay: Duration,
}

#[async_trait]
impl EventPublisher for SlowPublisher {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError> {
        tokio::time::sleep(self.delay).await;
        self.inner.publish(event).await
    }
}

/// Counts how often it was told about a commit.
#[derive(Default)]
struct CountingHook {
    calls: AtomicUsize,
}

impl CountingHook {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitHook for CountingHook {
    async fn committed(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn anonymous() -> Arc<dyn CurrentUser> {
    Arc::new(Anonymous)
}

mod atomicity {
    use super::*;

    #[tokio::test]
    async fn persistence_failure_publishes_nothing_and_keeps_events() {
        let store = FlakyStore::default();
        let publisher = InMemoryEventPublisher::new();
        let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), Arc::new(publisher.clone()));

        let mut product = Product::list("SKU-1", 999);
        store.fail_commits(true);
        let mut uow = factory.begin(anonymous(), CancellationToken::new());
        uow.add(&mut product).unwrap();
        let err = uow.commit().await.unwrap_err();

        assert!(matches!(err, UnitOfWorkError::Persistence(_)));
        assert_eq!(publisher.published_count().await, 0);
        assert_eq!(product.pending_events().len(), 2);
        assert!(!store.exists("Product", product.id()).await.unwrap());

        // The retained events go out with the retry.
        store.fail_commits(false);
        let mut uow = factory.begin(anonymous(), CancellationToken::new());
        uow.add(&mut product).unwrap();
        let receipt = uow.commit().await.unwrap();

        assert_eq!(receipt.published.len(), 2);
        assert!(product.pending_events().is_empty());
        assert_eq!(
            publisher.published_types().await,
            vec!["ProductListed", "ProductRepriced"]
        );
    }

    #[tokio::test]
    async fn one_conflict_rolls_back_every_staged_change() {
        let store = InMemoryEntityStore::new();
        let publisher = InMemoryEventPublisher::new();
        let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), Arc::new(publisher.clone()));

        let mut existing = Product::list("SKU-OLD", 100);
        let mut uow = factory.begin(anonymous(), CancellationToken::new());
        uow.add(&mut existing).unwrap();
        uow.commit().await.unwrap();

        let reader = factory.begin(anonymous(), CancellationToken::new());
        let mut stale: Product = reader.load(existing.id()).await.unwrap().unwrap();
        let mut winner: Product = reader.load(existing.id()).await.unwrap().unwrap();
        drop(reader);

        winner.reprice(150);
        let mut uow = factory.begin(anonymous(), CancellationToken::new());
        uow.update(&mut winner).unwrap();
        uow.commit().await.unwrap();

        let mut fresh = Product::list("SKU-NEW", 500);
        stale.reprice(120);
        let mut uow = factory.begin(anonymous(), CancellationToken::new());
        uow.add(&mut fresh).unwrap();
        uow.update(&mut stale).unwrap();
        let err = uow.commit().await.unwrap_err();

        assert!(matches!(err, UnitOfWorkError::Concurrency(_)));
        assert!(!store.exists("Product", fresh.id()).await.unwrap());
        assert_eq!(fresh.pending_events().len(), 2);

        let stored = store.get("Product", existing.id()).await.unwrap().unwrap();
        assert_eq!(stored.state["cents"], 150);
        // 2 from the first add, 1 from the winning reprice
        assert_eq!(publisher.published_count().await, 3);
    }
}

mod publication {
    use super::*;

    #[tokio::test]
    async fn delivery_failure_is_reported_but_commit_stands() {
        let store = InMemoryEntityStore::new();
        let inner = InMemoryEventPublisher::new();
        let publisher = SelectivePublisher {
            inner: inner.clone(),
            reject: "ProductRepriced",
        };
        let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), Arc::new(publisher));

        let mut product = Product::list("SKU-2", 250);
        let mut uow = factory.begin(anonymous(), CancellationToken::new());
        uow.add(&mut product).unwrap();
        let receipt = uow.commit().await.unwrap();

        assert!(!receipt.fully_published());
        assert_eq!(receipt.published.len(), 1);
        assert_eq!(receipt.publish_failures.len(), 1);
        assert_eq!(receipt.publish_failures[0].event_type, "ProductRepriced");
        assert_eq!(receipt.publish_failures[0].aggregate_id, product.id());

        assert!(store.exists("Product", product.id()).await.unwrap());
        assert!(product.pending_events().is_empty());
        assert_eq!(inner.published_types().await, vec!["ProductListed"]);
    }

    #[tokio::test]
    async fn cancellation_during_publish_does_not_stop_delivery() {
        let store = InMemoryEntityStore::new();
        let inner = InMemoryEventPublisher::new();
        let token = CancellationToken::new();
        let publisher = CancellingPublisher {
            inner: inner.clone(),
            token: token.clone(),
        };
        let factory = UnitOfWorkFactory::new(Arc::new(store), Arc::new(publisher));

        let mut product = Product::list("SKU-3", 10);
        let mut uow = factory.begin(anonymous(), token.clone());
        uow.add(&mut product).unwrap();
        let receipt = uow.commit().await.unwrap();

        assert!(token.is_cancelled());
        assert_eq!(receipt.published.len(), 2);
        assert_eq!(inner.published_count().await, 2);
    }

    #[tokio::test]
    async fn envelopes_carry_the_committed_version() {
        let store = InMemoryEntityStore::new();
        let publisher = InMemoryEventPublisher::new();
        let mut events = publisher.subscribe();
        let factory = UnitOfWorkFactory::new(Arc::new(store), Arc::new(publisher.clone()));

        let mut product = Product::list("SKU-4", 75);
        let mut uow = factory.begin(anonymous(), CancellationToken::new());
        uow.add(&mut product).unwrap();
        uow.commit().await.unwrap();

        let first = events.next().await.unwrap();
        let second = events.next().await.unwrap();
        assert_eq!(first.aggregate_type, "Product");
        assert_eq!(first.aggregate_version, Version::new(2));
        assert_eq!(second.aggregate_version, Version::new(2));

        let repriced: ProductEvent = second.decode().unwrap();
        assert!(matches!(repriced, ProductEvent::Repriced { cents: 75 }));
    }

    #[tokio::test]
    async fn hooks_run_after_a_successful_commit_only() {
        let store = FlakyStore::default();
        let factory = UnitOfWorkFactory::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryEventPublisher::new()),
        );
        let hook = Arc::new(CountingHook::default());

        let mut product = Product::list("SKU-5", 40);
        store.fail_commits(true);
        let mut uow = factory
            .begin(anonymous(), CancellationToken::new())
            .on_commit(hook.clone());
        uow.add(&mut product).unwrap();
        assert!(uow.commit().await.is_err());
        assert_eq!(hook.calls(), 0);

        store.fail_commits(false);
        let mut uow = factory
            .begin(anonymous(), CancellationToken::new())
            .on_commit(hook.clone());
        uow.add(&mut product).unwrap();
        uow.commit().await.unwrap();
        assert_eq!(hook.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_commit_future_still_delivers_everything() {
        let store = InMemoryEntityStore::new();
        let inner = InMemoryEventPublisher::new();
        let publisher = SlowPublisher {
            inner: inner.clone(),
            delay: Duration::from_millis(200),
        };
        let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), Arc::new(publisher));
        let hook = Arc::new(CountingHook::default());

        let mut product = Product::list("SKU-6", 60);
        let id = product.id();
        let mut uow = factory
            .begin(anonymous(), CancellationToken::new())
            .on_commit(hook.clone());
        uow.add(&mut product).unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(50), uow.commit()).await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(store.exists("Product", id).await.unwrap());
        assert_eq!(
            inner.published_types().await,
            vec!["ProductListed", "ProductRepriced"]
        );
        assert_eq!(hook.calls(), 1);
    }
}
