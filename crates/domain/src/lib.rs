//! Domain layer for the request pipeline.
//!
//! This crate provides:
//! - `Aggregate` and `AggregateRoot`, with an owned queue of raised events
//! - `DomainEvent` and the `EventEnvelope` published after commit
//! - `EventPublisher` and an in-memory implementation
//! - `CurrentUser`, the read-only actor accessor used for audit stamps
//! - `UnitOfWork`, which stamps audit columns, commits atomically and
//!   only then drains and publishes events

pub mod aggregate;
pub mod current_user;
pub mod error;
pub mod event;
pub mod publisher;
pub mod unit_of_work;

pub use aggregate::{Aggregate, AggregateRoot, EventQueue};
pub use common::AggregateId;
pub use current_user::{Anonymous, AuthenticatedUser, CurrentUser, SYSTEM_ACTOR};
pub use entity_store::{AuditInfo, Version};
pub use error::UnitOfWorkError;
pub use event::{DomainEvent, EventEnvelope, EventId, EventSource, RaisedEvent};
pub use publisher::{
    EventPublisher, EventStream, InMemoryEventPublisher, PostCommitPublishError, PublishError,
};
pub use unit_of_work::{CommitHook, CommitReceipt, UnitOfWork, UnitOfWorkFactory};
