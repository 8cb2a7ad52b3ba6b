//! Core aggregate trait and the root state every aggregate embeds.

use common::AggregateId;
use entity_store::{AuditInfo, Version};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::event::{DomainEvent, RaisedEvent};

/// Owned, ordered buffer of events raised by one aggregate instance.
///
/// Events are appended by business methods and moved out by value when the
/// unit of work drains the queue after a successful commit.
#[derive(Debug)]
pub struct EventQueue<E> {
    pending: Vec<RaisedEvent<E>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<E> EventQueue<E> {
    /// Appends an event, stamping its id and time.
    pub fn raise(&mut self, event: E) {
        self.pending.push(RaisedEvent::new(event));
    }

    /// Returns the pending events in raise order.
    pub fn as_slice(&self) -> &[RaisedEvent<E>] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Moves every pending event out, leaving the queue empty.
    pub(crate) fn drain(&mut self) -> Vec<RaisedEvent<E>> {
        std::mem::take(&mut self.pending)
    }
}

/// State shared by every aggregate: identity, version, audit columns and
/// the queue of raised events.
///
/// Only the identity is part of the serialized state. Version and audit
/// columns live in the store record and are restored on load; the event
/// queue is never persisted. Audit columns and the persisted version can
/// only be written by the unit of work.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AggregateRoot<E> {
    id: AggregateId,

    #[serde(skip)]
    version: Version,

    #[serde(skip)]
    persisted_version: Option<Version>,

    #[serde(skip)]
    audit: AuditInfo,

    #[serde(skip)]
    events: EventQueue<E>,
}

impl<E> AggregateRoot<E> {
    /// Creates the root of a new, never-persisted aggregate.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            version: Version::initial(),
            persisted_version: None,
            audit: AuditInfo::default(),
            events: EventQueue::default(),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    /// Returns the current version, including uncommitted mutations.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    /// Returns true until the aggregate has been committed or loaded.
    pub fn is_new(&self) -> bool {
        self.persisted_version.is_none()
    }

    /// Returns the events raised since load, in raise order.
    pub fn pending_events(&self) -> &[RaisedEvent<E>] {
        self.events.as_slice()
    }

    /// Records a mutation that raised `event`.
    pub fn record(&mut self, event: E) {
        self.events.raise(event);
        self.version = self.version.next();
    }

    /// Records a mutation that raised no event.
    pub fn touch(&mut self) {
        self.version = self.version.next();
    }

    pub(crate) fn persisted_version(&self) -> Option<Version> {
        self.persisted_version
    }

    /// Rehydrates store-owned state after deserializing a record.
    pub(crate) fn restore(&mut self, id: AggregateId, version: Version, audit: AuditInfo) {
        self.id = id;
        self.version = version;
        self.persisted_version = Some(version);
        self.audit = audit;
    }

    /// Accepts the stored version and audit columns of a successful commit
    /// and hands back the drained events.
    pub(crate) fn commit_succeeded(
        &mut self,
        version: Version,
        audit: AuditInfo,
    ) -> Vec<RaisedEvent<E>> {
        self.version = version;
        self.persisted_version = Some(version);
        self.audit = audit;
        self.events.drain()
    }
}

/// Trait for aggregates persisted through the unit of work.
///
/// Business methods mutate state and call [`AggregateRoot::record`] to
/// queue the resulting event. They never touch persistence. Aggregates are
/// deliberately not `Clone`: a pending event must have exactly one owner.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The type of events this aggregate raises.
    type Event: DomainEvent;

    /// Returns the aggregate type name, used as the store's entity type.
    fn aggregate_type() -> &'static str;

    fn root(&self) -> &AggregateRoot<Self::Event>;

    fn root_mut(&mut self) -> &mut AggregateRoot<Self::Event>;

    /// Whether the unit of work stamps audit columns on this aggregate.
    ///
    /// Audited aggregates are soft-deleted; the rest are removed outright.
    fn audited() -> bool {
        true
    }

    fn id(&self) -> AggregateId {
        self.root().id()
    }

    fn version(&self) -> Version {
        self.root().version()
    }

    fn audit(&self) -> &AuditInfo {
        self.root().audit()
    }

    fn pending_events(&self) -> &[RaisedEvent<Self::Event>] {
        self.root().pending_events()
    }
}
