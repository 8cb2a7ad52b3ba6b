//! Unit of work error types.

use common::AggregateId;
use entity_store::StoreError;
use thiserror::Error;

/// Errors that can occur while staging or committing a unit of work.
///
/// None of these leave anything persisted or published.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// Another writer changed the same entity first. Retry against fresh state.
    #[error("Concurrency conflict: {0}")]
    Concurrency(#[source] StoreError),

    /// The store rejected or failed the commit; it was rolled back.
    #[error("Persistence error: {0}")]
    Persistence(#[source] StoreError),

    /// An update or removal was staged for an aggregate that was never loaded.
    #[error("{aggregate_type} {id} was not loaded from the store; stage it with add")]
    NotTracked {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    /// An add was staged for an aggregate that already exists.
    #[error("{aggregate_type} {id} is already persisted; stage it with update")]
    AlreadyPersisted {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    /// State or event serialization failed before anything was written.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cancellation was requested before the commit reached the store.
    #[error("Unit of work cancelled before commit")]
    Cancelled,

    /// The background commit task panicked or was aborted; the outcome of
    /// the store commit is unknown.
    #[error("Commit task did not complete: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

impl From<StoreError> for UnitOfWorkError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            UnitOfWorkError::Concurrency(err)
        } else {
            UnitOfWorkError::Persistence(err)
        }
    }
}
