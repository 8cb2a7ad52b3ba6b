use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, ChangeKind, EntityChange, EntityQuery, EntityRecord, Result, StoreError, Version,
    store::{EntityStore, validate_changes},
};

type Key = (String, AggregateId);

#[derive(Debug, Clone)]
struct Row {
    seq: u64,
    record: EntityRecord,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Key, Row>,
    next_seq: u64,
}

/// In-memory entity store.
///
/// Provides the same interface and conflict semantics as the PostgreSQL
/// implementation. Clones share the same underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryEntityStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryEntityStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored rows, soft-deleted ones included.
    pub async fn row_count(&self) -> usize {
        self.tables.read().await.rows.len()
    }

    /// Clears all rows.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.rows.clear();
        tables.next_seq = 0;
    }

    fn check(tables: &Tables, change: &EntityChange) -> Result<()> {
        let (entity_type, id) = change.target();
        let current = tables
            .rows
            .get(&(entity_type.to_string(), id))
            .map(|row| row.record.version);

        match (change.kind, current, change.expected_version) {
            (ChangeKind::Insert, Some(_), _) => Err(StoreError::DuplicateEntity {
                entity_type: entity_type.to_string(),
                id,
            }),
            (ChangeKind::Insert, None, _) => Ok(()),
            (_, None, _) => Err(StoreError::EntityNotFound {
                entity_type: entity_type.to_string(),
                id,
            }),
            (_, Some(actual), Some(expected)) if actual != expected => {
                Err(StoreError::ConcurrencyConflict {
                    entity_type: entity_type.to_string(),
                    id,
                    expected,
                    actual,
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn commit(&self, changes: Vec<EntityChange>) -> Result<()> {
        validate_changes(&changes)?;

        let mut tables = self.tables.write().await;

        // Check everything before applying anything
        for change in &changes {
            Self::check(&tables, change)?;
        }

        for change in changes {
            let key = (change.record.entity_type.clone(), change.record.id);
            match change.kind {
                ChangeKind::Insert => {
                    let seq = tables.next_seq;
                    tables.next_seq += 1;
                    tables.rows.insert(
                        key,
                        Row {
                            seq,
                            record: change.record,
                        },
                    );
                }
                ChangeKind::Update => {
                    if let Some(row) = tables.rows.get_mut(&key) {
                        row.record = change.record;
                    }
                }
                ChangeKind::Delete => {
                    tables.rows.remove(&key);
                }
            }
        }

        Ok(())
    }

    async fn get(&self, entity_type: &str, id: AggregateId) -> Result<Option<EntityRecord>> {
        Ok(self
            .get_including_deleted(entity_type, id)
            .await?
            .filter(|record| !record.is_deleted()))
    }

    async fn get_including_deleted(
        &self,
        entity_type: &str,
        id: AggregateId,
    ) -> Result<Option<EntityRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .get(&(entity_type.to_string(), id))
            .map(|row| row.record.clone()))
    }

    async fn query(&self, query: EntityQuery) -> Result<Vec<EntityRecord>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .rows
            .values()
            .filter(|row| query.matches(&row.record))
            .collect();
        rows.sort_by_key(|row| row.seq);

        let (skip, take) = query.window();
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|row| row.record.clone())
            .collect())
    }

    async fn version_of(&self, entity_type: &str, id: AggregateId) -> Result<Option<Version>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .get(&(entity_type.to_string(), id))
            .map(|row| row.record.version))
    }
}
