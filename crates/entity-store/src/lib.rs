//! Persistence store for versioned entities.
//!
//! Entities are stored as JSON state plus a version used for optimistic
//! concurrency and a set of audit columns. Writes are submitted as change
//! sets that apply all-or-nothing.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::AggregateId;
pub use error::{Result, StoreError};
pub use memory::InMemoryEntityStore;
pub use postgres::PostgresEntityStore;
pub use query::EntityQuery;
pub use record::{AuditInfo, ChangeKind, EntityChange, EntityRecord, Version};
pub use store::{EntityStore, EntityStoreExt, validate_changes};
