use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, AuditInfo, ChangeKind, EntityChange, EntityQuery, EntityRecord, Result,
    StoreError, Version,
    store::{EntityStore, validate_changes},
};

const SELECT_COLUMNS: &str = "entity_type, id, version, state, created_at, created_by, updated_at, updated_by, is_deleted";

/// PostgreSQL-backed entity store.
///
/// Each commit runs in a single transaction; any failed change rolls the
/// whole set back.
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Creates a new PostgreSQL entity store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<EntityRecord> {
        Ok(EntityRecord {
            entity_type: row.try_get("entity_type")?,
            id: AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
            version: Version::new(row.try_get("version")?),
            state: row.try_get("state")?,
            audit: AuditInfo {
                created_at: row.try_get("created_at")?,
                created_by: row.try_get("created_by")?,
                updated_at: row.try_get("updated_at")?,
                updated_by: row.try_get("updated_by")?,
                is_deleted: row.try_get("is_deleted")?,
            },
        })
    }

    /// Resolves why a guarded write matched no row.
    async fn guard_failure(
        tx: &mut Transaction<'_, Postgres>,
        change: &EntityChange,
    ) -> Result<StoreError> {
        let (entity_type, id) = change.target();
        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM entities WHERE entity_type = $1 AND id = $2")
                .bind(entity_type)
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;

        Ok(match actual {
            Some(actual) => StoreError::ConcurrencyConflict {
                entity_type: entity_type.to_string(),
                id,
                expected: change.expected_version.unwrap_or_default(),
                actual: Version::new(actual),
            },
            None => StoreError::EntityNotFound {
                entity_type: entity_type.to_string(),
                id,
            },
        })
    }

    async fn apply(tx: &mut Transaction<'_, Postgres>, change: &EntityChange) -> Result<()> {
        let record = &change.record;
        let expected = change.expected_version.unwrap_or_default().as_i64();

        let affected = match change.kind {
            ChangeKind::Insert => sqlx::query(
                r#"
                INSERT INTO entities (entity_type, id, version, state, created_at, created_by, updated_at, updated_by, is_deleted)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (entity_type, id) DO NOTHING
                "#,
            )
            .bind(&record.entity_type)
            .bind(record.id.as_uuid())
            .bind(record.version.as_i64())
            .bind(&record.state)
            .bind(record.audit.created_at)
            .bind(&record.audit.created_by)
            .bind(record.audit.updated_at)
            .bind(&record.audit.updated_by)
            .bind(record.audit.is_deleted)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
            ChangeKind::Update => sqlx::query(
                r#"
                UPDATE entities
                SET version = $3, state = $4, created_at = $5, created_by = $6,
                    updated_at = $7, updated_by = $8, is_deleted = $9
                WHERE entity_type = $1 AND id = $2 AND version = $10
                "#,
            )
            .bind(&record.entity_type)
            .bind(record.id.as_uuid())
            .bind(record.version.as_i64())
            .bind(&record.state)
            .bind(record.audit.created_at)
            .bind(&record.audit.created_by)
            .bind(record.audit.updated_at)
            .bind(&record.audit.updated_by)
            .bind(record.audit.is_deleted)
            .bind(expected)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
            ChangeKind::Delete => {
                sqlx::query("DELETE FROM entities WHERE entity_type = $1 AND id = $2 AND version = $3")
                    .bind(&record.entity_type)
                    .bind(record.id.as_uuid())
                    .bind(expected)
                    .execute(&mut **tx)
                    .await?
                    .rows_affected()
            }
        };

        if affected == 1 {
            return Ok(());
        }

        match change.kind {
            ChangeKind::Insert => Err(StoreError::DuplicateEntity {
                entity_type: record.entity_type.clone(),
                id: record.id,
            }),
            ChangeKind::Update | ChangeKind::Delete => Err(Self::guard_failure(tx, change).await?),
        }
    }
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    #[tracing::instrument(skip(self, changes), fields(changes = changes.len()))]
    async fn commit(&self, changes: Vec<EntityChange>) -> Result<()> {
        validate_changes(&changes)?;

        let mut tx = self.pool.begin().await?;
        for change in &changes {
            // Dropping `tx` on the error path rolls back.
            Self::apply(&mut tx, change).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn get(&self, entity_type: &str, id: AggregateId) -> Result<Option<EntityRecord>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM entities WHERE entity_type = $1 AND id = $2 AND NOT is_deleted"
        ))
        .bind(entity_type)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn get_including_deleted(
        &self,
        entity_type: &str,
        id: AggregateId,
    ) -> Result<Option<EntityRecord>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM entities WHERE entity_type = $1 AND id = $2"
        ))
        .bind(entity_type)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn query(&self, query: EntityQuery) -> Result<Vec<EntityRecord>> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM entities WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if !query.include_deleted {
            sql.push_str(" AND NOT is_deleted");
        }
        if query.entity_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND entity_type = ${param_count}"));
        }
        if query.ids.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND id = ANY(${param_count})"));
        }

        sql.push_str(" ORDER BY seq ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(entity_type) = query.entity_type {
            sqlx_query = sqlx_query.bind(entity_type);
        }
        if let Some(ids) = query.ids {
            let ids: Vec<Uuid> = ids.into_iter().map(Uuid::from).collect();
            sqlx_query = sqlx_query.bind(ids);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn version_of(&self, entity_type: &str, id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM entities WHERE entity_type = $1 AND id = $2")
                .bind(entity_type)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }
}
