//! The transactional boundary around a request's writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use entity_store::{AuditInfo, EntityChange, EntityQuery, EntityRecord, EntityStore, Version};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::aggregate::Aggregate;
use crate::current_user::CurrentUser;
use crate::error::UnitOfWorkError;
use crate::event::{EventEnvelope, EventId, EventSource};
use crate::publisher::{EventPublisher, PostCommitPublishError};

/// Creates units of work bound to a store and a publisher.
///
/// Cheap to clone; handlers keep one and call [`UnitOfWorkFactory::begin`]
/// once per request.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl UnitOfWorkFactory {
    pub fn new(store: Arc<dyn EntityStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Starts a unit of work acting as `user`.
    ///
    /// `cancellation` is honoured up to the point the commit reaches the
    /// store; it never interrupts publishing.
    pub fn begin<'a>(
        &self,
        user: Arc<dyn CurrentUser>,
        cancellation: CancellationToken,
    ) -> UnitOfWork<'a> {
        UnitOfWork {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            user,
            cancellation,
            metadata: HashMap::new(),
            hooks: Vec::new(),
            staged: Vec::new(),
        }
    }
}

/// Follow-up work owed once a commit has reached the store.
///
/// Hooks run on the commit's background task after publishing, so they
/// complete even when the caller stops waiting for the commit.
#[async_trait]
pub trait CommitHook: Send + Sync {
    async fn committed(&self);
}

/// Outcome of a successful commit.
#[derive(Debug, Default)]
pub struct CommitReceipt {
    /// Number of entities written.
    pub entities: usize,

    /// Events delivered to the publisher, in publish order.
    pub published: Vec<EventId>,

    /// Events that were committed but could not be delivered.
    pub publish_failures: Vec<PostCommitPublishError>,
}

impl CommitReceipt {
    /// Returns true when every drained event reached the publisher.
    pub fn fully_published(&self) -> bool {
        self.publish_failures.is_empty()
    }

    /// Number of events drained from aggregates by this commit.
    pub fn events_drained(&self) -> usize {
        self.published.len() + self.publish_failures.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Add,
    Update,
    Remove,
}

/// Object-safe view of a staged aggregate.
trait Tracked: Send + Sync {
    fn entity_type(&self) -> &'static str;
    fn entity_id(&self) -> AggregateId;
    fn is_audited(&self) -> bool;
    fn current_version(&self) -> Version;
    fn persisted_version(&self) -> Option<Version>;
    fn audit_info(&self) -> &AuditInfo;
    fn state(&self) -> serde_json::Result<serde_json::Value>;
    fn envelopes(
        &self,
        version: Version,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> serde_json::Result<Vec<EventEnvelope>>;
    fn commit_succeeded(&mut self, version: Version, audit: AuditInfo) -> usize;
}

impl<A: Aggregate> Tracked for A {
    fn entity_type(&self) -> &'static str {
        <A as Aggregate>::aggregate_type()
    }

    fn entity_id(&self) -> AggregateId {
        self.root().id()
    }

    fn is_audited(&self) -> bool {
        A::audited()
    }

    fn current_version(&self) -> Version {
        self.root().version()
    }

    fn persisted_version(&self) -> Option<Version> {
        self.root().persisted_version()
    }

    fn audit_info(&self) -> &AuditInfo {
        self.root().audit()
    }

    fn state(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn envelopes(
        &self,
        version: Version,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> serde_json::Result<Vec<EventEnvelope>> {
        let source = EventSource {
            aggregate_id: self.root().id(),
            aggregate_type: <A as Aggregate>::aggregate_type(),
            version,
        };
        self.pending_events()
            .iter()
            .map(|raised| raised.seal(&source, metadata))
            .collect()
    }

    fn commit_succeeded(&mut self, version: Version, audit: AuditInfo) -> usize {
        self.root_mut().commit_succeeded(version, audit).len()
    }
}

struct Staged<'a> {
    intent: Intent,
    entity: &'a mut dyn Tracked,
}

/// What one staged aggregate turns into at commit time.
struct Planned {
    change: EntityChange,
    version: Version,
    audit: AuditInfo,
}

/// A single request's writes.
///
/// Aggregates are staged by mutable borrow and stay borrowed until
/// [`UnitOfWork::commit`] consumes the unit of work. A unit of work is
/// never reused across requests.
pub struct UnitOfWork<'a> {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    user: Arc<dyn CurrentUser>,
    cancellation: CancellationToken,
    metadata: HashMap<String, serde_json::Value>,
    hooks: Vec<Arc<dyn CommitHook>>,
    staged: Vec<Staged<'a>>,
}

impl<'a> UnitOfWork<'a> {
    /// Attaches a metadata entry to every event this unit of work publishes.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Registers work to run after a successful commit.
    pub fn on_commit(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Number of staged aggregates.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Loads a live aggregate. Soft-deleted aggregates read as absent.
    pub async fn load<A: Aggregate>(&self, id: AggregateId) -> Result<Option<A>, UnitOfWorkError> {
        self.store
            .get(A::aggregate_type(), id)
            .await?
            .map(hydrate)
            .transpose()
    }

    /// Loads an aggregate even if it was soft-deleted.
    pub async fn load_including_deleted<A: Aggregate>(
        &self,
        id: AggregateId,
    ) -> Result<Option<A>, UnitOfWorkError> {
        self.store
            .get_including_deleted(A::aggregate_type(), id)
            .await?
            .map(hydrate)
            .transpose()
    }

    /// Lists every live aggregate of one type, in insertion order.
    pub async fn list<A: Aggregate>(&self) -> Result<Vec<A>, UnitOfWorkError> {
        self.store
            .query(EntityQuery::for_type(A::aggregate_type()))
            .await?
            .into_iter()
            .map(hydrate)
            .collect()
    }

    /// Stages a new aggregate for insertion.
    pub fn add<A: Aggregate>(&mut self, aggregate: &'a mut A) -> Result<(), UnitOfWorkError> {
        if !aggregate.root().is_new() {
            return Err(UnitOfWorkError::AlreadyPersisted {
                aggregate_type: A::aggregate_type(),
                id: aggregate.id(),
            });
        }
        self.stage(Intent::Add, aggregate);
        Ok(())
    }

    /// Stages a loaded aggregate's modifications.
    pub fn update<A: Aggregate>(&mut self, aggregate: &'a mut A) -> Result<(), UnitOfWorkError> {
        Self::ensure_tracked(aggregate)?;
        self.stage(Intent::Update, aggregate);
        Ok(())
    }

    /// Stages a delete intent for a loaded aggregate.
    ///
    /// Audited aggregates are soft-deleted; others are removed outright.
    pub fn remove<A: Aggregate>(&mut self, aggregate: &'a mut A) -> Result<(), UnitOfWorkError> {
        Self::ensure_tracked(aggregate)?;
        self.stage(Intent::Remove, aggregate);
        Ok(())
    }

    fn ensure_tracked<A: Aggregate>(aggregate: &A) -> Result<(), UnitOfWorkError> {
        if aggregate.root().is_new() {
            return Err(UnitOfWorkError::NotTracked {
                aggregate_type: A::aggregate_type(),
                id: aggregate.id(),
            });
        }
        Ok(())
    }

    fn stage<A: Aggregate>(&mut self, intent: Intent, aggregate: &'a mut A) {
        tracing::trace!(
            aggregate_type = A::aggregate_type(),
            id = %aggregate.id(),
            ?intent,
            "staged aggregate"
        );
        self.staged.push(Staged {
            intent,
            entity: aggregate,
        });
    }

    /// Stamps audit columns, persists every staged change atomically, then
    /// drains and publishes the raised events.
    ///
    /// The store commit, publishing and commit hooks run on a spawned task.
    /// Once the store has been asked to commit, dropping this future neither
    /// rolls the write back nor loses its events. Delivery failures are
    /// reported in the receipt, not as an error.
    #[tracing::instrument(skip(self), fields(staged = self.staged.len(), actor = tracing::field::Empty))]
    pub async fn commit(mut self) -> Result<CommitReceipt, UnitOfWorkError> {
        if self.staged.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let actor = self.user.actor();
        tracing::Span::current().record("actor", actor.as_str());

        let mut metadata = self.metadata.clone();
        metadata.insert("actor".to_string(), serde_json::Value::from(actor.as_str()));

        // One timestamp for every stamp in this commit
        let now = Utc::now();
        let mut plans = Vec::with_capacity(self.staged.len());
        let mut envelopes = Vec::new();
        for staged in &self.staged {
            let plan = plan_change(&*staged.entity, staged.intent, now, &actor)?;
            envelopes.extend(staged.entity.envelopes(plan.version, &metadata)?);
            plans.push(plan);
        }

        if self.cancellation.is_cancelled() {
            tracing::info!("unit of work cancelled before commit");
            return Err(UnitOfWorkError::Cancelled);
        }

        let (changes, outcomes): (Vec<_>, Vec<_>) = plans
            .into_iter()
            .map(|plan| (plan.change, (plan.version, plan.audit)))
            .unzip();

        let raised = envelopes.len();
        let tail = CommitTail {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            hooks: std::mem::take(&mut self.hooks),
            changes,
            envelopes,
        };
        let delivery = tokio::spawn(tail.run().in_current_span()).await??;

        let mut drained = 0;
        for (staged, (version, audit)) in self.staged.iter_mut().zip(outcomes) {
            drained += staged.entity.commit_succeeded(version, audit);
        }
        debug_assert_eq!(drained, raised);

        let receipt = CommitReceipt {
            entities: self.staged.len(),
            published: delivery.published,
            publish_failures: delivery.failures,
        };
        tracing::debug!(
            entities = receipt.entities,
            published = receipt.published.len(),
            failed = receipt.publish_failures.len(),
            "unit of work committed"
        );
        Ok(receipt)
    }
}

/// Everything a commit needs once it leaves the caller's borrow.
struct CommitTail {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    hooks: Vec<Arc<dyn CommitHook>>,
    changes: Vec<EntityChange>,
    envelopes: Vec<EventEnvelope>,
}

#[derive(Default)]
struct Delivery {
    published: Vec<EventId>,
    failures: Vec<PostCommitPublishError>,
}

impl CommitTail {
    async fn run(self) -> Result<Delivery, UnitOfWorkError> {
        if let Err(err) = self.store.commit(self.changes).await {
            metrics::counter!("uow_commit_failures_total").increment(1);
            tracing::warn!(error = %err, "commit failed, nothing persisted");
            return Err(err.into());
        }
        metrics::counter!("uow_commits_total").increment(1);

        let mut delivery = Delivery::default();
        for envelope in &self.envelopes {
            match self.publisher.publish(envelope).await {
                Ok(()) => {
                    metrics::counter!("uow_events_published_total").increment(1);
                    delivery.published.push(envelope.event_id);
                }
                Err(source) => {
                    let failure = PostCommitPublishError::new(envelope, source);
                    metrics::counter!("uow_publish_failures_total").increment(1);
                    tracing::error!(
                        event_id = %failure.event_id,
                        event_type = %failure.event_type,
                        aggregate_id = %failure.aggregate_id,
                        error = %failure.source,
                        "event committed but not delivered"
                    );
                    delivery.failures.push(failure);
                }
            }
        }

        for hook in &self.hooks {
            hook.committed().await;
        }
        Ok(delivery)
    }
}

fn hydrate<A: Aggregate>(record: EntityRecord) -> Result<A, UnitOfWorkError> {
    let mut aggregate: A = serde_json::from_value(record.state)?;
    aggregate
        .root_mut()
        .restore(record.id, record.version, record.audit);
    Ok(aggregate)
}

fn plan_change(
    entity: &dyn Tracked,
    intent: Intent,
    now: DateTime<Utc>,
    actor: &str,
) -> Result<Planned, UnitOfWorkError> {
    let mut audit = entity.audit_info().clone();
    let audited = entity.is_audited();
    let base = entity.persisted_version().unwrap_or_default();
    let version = entity.current_version().max(base.next());

    let record = |version: Version, audit: &AuditInfo| -> Result<EntityRecord, UnitOfWorkError> {
        Ok(EntityRecord::new(
            entity.entity_type(),
            entity.entity_id(),
            version,
            entity.state()?,
        )
        .with_audit(audit.clone()))
    };

    let (change, version) = match intent {
        Intent::Add => {
            if audited {
                audit.stamp_created(now, actor);
            }
            (EntityChange::insert(record(version, &audit)?), version)
        }
        Intent::Update => {
            if audited {
                audit.stamp_updated(now, actor);
            }
            (EntityChange::update(record(version, &audit)?, base), version)
        }
        Intent::Remove if audited => {
            audit.stamp_deleted(now, actor);
            (EntityChange::update(record(version, &audit)?, base), version)
        }
        Intent::Remove => (EntityChange::delete(record(base, &audit)?, base), base),
    };

    Ok(Planned {
        change,
        version,
        audit,
    })
}
