use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    AggregateId, ChangeKind, EntityChange, EntityQuery, EntityRecord, Result, StoreError, Version,
};

/// Core trait for entity store implementations.
///
/// The store is the sole source of truth. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Applies a change set atomically - either every change lands or none do.
    ///
    /// Updates and deletes fail with `ConcurrencyConflict` when the stored
    /// version differs from `expected_version`. Inserts fail with
    /// `DuplicateEntity` if the id is taken, including by a soft-deleted row.
    async fn commit(&self, changes: Vec<EntityChange>) -> Result<()>;

    /// Retrieves a live entity. Soft-deleted rows are treated as absent.
    async fn get(&self, entity_type: &str, id: AggregateId) -> Result<Option<EntityRecord>>;

    /// Retrieves an entity whether or not it has been soft-deleted.
    async fn get_including_deleted(
        &self,
        entity_type: &str,
        id: AggregateId,
    ) -> Result<Option<EntityRecord>>;

    /// Retrieves entities matching a query, in order of first insertion.
    /// Updating an entity does not move it.
    async fn query(&self, query: EntityQuery) -> Result<Vec<EntityRecord>>;

    /// Gets the stored version of an entity, deleted or not.
    ///
    /// Returns None if the entity doesn't exist.
    async fn version_of(&self, entity_type: &str, id: AggregateId) -> Result<Option<Version>>;
}

/// Extension trait providing convenience methods for entity stores.
#[async_trait]
pub trait EntityStoreExt: EntityStore {
    /// Applies a single change.
    async fn commit_one(&self, change: EntityChange) -> Result<()> {
        self.commit(vec![change]).await
    }

    /// Checks if a live entity exists.
    async fn exists(&self, entity_type: &str, id: AggregateId) -> Result<bool> {
        Ok(self.get(entity_type, id).await?.is_some())
    }

    /// Lists all live entities of one type.
    async fn list(&self, entity_type: &str) -> Result<Vec<EntityRecord>> {
        self.query(EntityQuery::for_type(entity_type)).await
    }
}

// Blanket implementation for all EntityStore implementations
impl<T: EntityStore + ?Sized> EntityStoreExt for T {}

/// Validates a change set before it reaches storage.
pub fn validate_changes(changes: &[EntityChange]) -> Result<()> {
    if changes.is_empty() {
        return Err(StoreError::InvalidChangeSet(
            "Cannot commit an empty change set".to_string(),
        ));
    }

    let mut targets = HashSet::with_capacity(changes.len());
    for change in changes {
        let (entity_type, id) = change.target();
        if entity_type.is_empty() {
            return Err(StoreError::InvalidChangeSet(format!(
                "Change for {id} has an empty entity type"
            )));
        }
        if !targets.insert((entity_type, id)) {
            return Err(StoreError::InvalidChangeSet(format!(
                "{entity_type} {id} appears more than once"
            )));
        }

        match (change.kind, change.expected_version) {
            (ChangeKind::Insert, Some(_)) => {
                return Err(StoreError::InvalidChangeSet(format!(
                    "Insert of {entity_type} {id} cannot carry an expected version"
                )));
            }
            (ChangeKind::Insert, None) => {
                if change.record.version <= Version::initial() {
                    return Err(StoreError::InvalidChangeSet(format!(
                        "Insert of {entity_type} {id} must store a version above 0"
                    )));
                }
            }
            (ChangeKind::Update | ChangeKind::Delete, None) => {
                return Err(StoreError::InvalidChangeSet(format!(
                    "{} of {entity_type} {id} requires an expected version",
                    change.kind
                )));
            }
            (ChangeKind::Update, Some(expected)) => {
                if change.record.version <= expected {
                    return Err(StoreError::InvalidChangeSet(format!(
                        "Update of {entity_type} {id} must store a version above {expected}, got {}",
                        change.record.version
                    )));
                }
            }
            (ChangeKind::Delete, Some(_)) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: i64) -> EntityRecord {
        EntityRecord::new(
            "Brand",
            AggregateId::new(),
            Version::new(version),
            serde_json::json!({"name": "Acme"}),
        )
    }

    #[test]
    fn rejects_empty_change_set() {
        assert!(matches!(
            validate_changes(&[]),
            Err(StoreError::InvalidChangeSet(_))
        ));
    }

    #[test]
    fn rejects_duplicate_targets() {
        let rec = record(1);
        let changes = vec![
            EntityChange::insert(rec.clone()),
            EntityChange::update(EntityRecord { version: Version::new(2), ..rec }, Version::first()),
        ];
        assert!(validate_changes(&changes).is_err());
    }

    #[test]
    fn rejects_update_that_does_not_advance_version() {
        let changes = vec![EntityChange::update(record(2), Version::new(2))];
        assert!(validate_changes(&changes).is_err());
    }

    #[test]
    fn rejects_insert_at_initial_version() {
        assert!(validate_changes(&[EntityChange::insert(record(0))]).is_err());
    }

    #[test]
    fn accepts_mixed_change_set() {
        let changes = vec![
            EntityChange::insert(record(1)),
            EntityChange::update(record(4), Version::new(3)),
            EntityChange::delete(record(2), Version::new(2)),
        ];
        assert!(validate_changes(&changes).is_ok());
    }
}
