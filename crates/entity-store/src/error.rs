use thiserror::Error;

use crate::{AggregateId, Version};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer committed since this one loaded the entity.
    #[error(
        "{entity_type} {id} was modified concurrently (expected version {expected}, stored {actual})"
    )]
    ConcurrencyConflict {
        entity_type: String,
        id: AggregateId,
        expected: Version,
        actual: Version,
    },

    #[error("{entity_type} {id} already exists")]
    DuplicateEntity { entity_type: String, id: AggregateId },

    #[error("{entity_type} {id} does not exist")]
    EntityNotFound { entity_type: String, id: AggregateId },

    /// Rejected before any row was touched.
    #[error("change set rejected: {0}")]
    InvalidChangeSet(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("entity state is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the write lost a race and a reload-and-retry may succeed.
    /// A vanished row counts: it was deleted by someone else.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. }
                | Self::DuplicateEntity { .. }
                | Self::EntityNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
