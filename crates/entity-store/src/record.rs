use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AggregateId;

/// Version number for an entity, used for optimistic concurrency control.
///
/// Version 0 means the entity has never been persisted. Every committed
/// write stores a strictly greater version than the one it replaced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for an entity that was never stored.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Audit columns carried by every stored entity.
///
/// Only the unit of work writes these; a record fresh from a handler has
/// them all unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub is_deleted: bool,
}

impl AuditInfo {
    /// Stamps creation metadata.
    pub fn stamp_created(&mut self, at: DateTime<Utc>, by: &str) {
        self.created_at = Some(at);
        self.created_by = Some(by.to_string());
    }

    /// Stamps modification metadata.
    pub fn stamp_updated(&mut self, at: DateTime<Utc>, by: &str) {
        self.updated_at = Some(at);
        self.updated_by = Some(by.to_string());
    }

    /// Flags the entity as logically deleted, stamped as a modification at `at`.
    pub fn stamp_deleted(&mut self, at: DateTime<Utc>, by: &str) {
        self.stamp_updated(at, by);
        self.is_deleted = true;
    }
}

/// A stored entity: identity, version, JSON state and audit columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// The type of entity (e.g., "Brand", "Attribute").
    pub entity_type: String,

    /// The entity's identity.
    pub id: AggregateId,

    /// The version this record was stored at.
    pub version: Version,

    /// The serialized entity state.
    pub state: serde_json::Value,

    /// Audit columns.
    #[serde(default)]
    pub audit: AuditInfo,
}

impl EntityRecord {
    /// Creates a record with empty audit columns.
    pub fn new(
        entity_type: impl Into<String>,
        id: AggregateId,
        version: Version,
        state: serde_json::Value,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            version,
            state,
            audit: AuditInfo::default(),
        }
    }

    /// Replaces the audit columns.
    pub fn with_audit(mut self, audit: AuditInfo) -> Self {
        self.audit = audit;
        self
    }

    /// Returns true if the record has been logically deleted.
    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted
    }
}

/// What a change does to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Store a new row. Fails if the id already exists.
    Insert,
    /// Replace an existing row. Soft deletes are updates with `is_deleted` set.
    Update,
    /// Physically remove an existing row.
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "insert"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// One staged write inside a change set.
#[derive(Debug, Clone)]
pub struct EntityChange {
    pub kind: ChangeKind,

    /// The record to write. For deletes only the identity is used.
    pub record: EntityRecord,

    /// The version the writer observed. `None` for inserts.
    pub expected_version: Option<Version>,
}

impl EntityChange {
    /// Creates an insert of a never-stored entity.
    pub fn insert(record: EntityRecord) -> Self {
        Self {
            kind: ChangeKind::Insert,
            record,
            expected_version: None,
        }
    }

    /// Creates an update guarded by the version the writer loaded.
    pub fn update(record: EntityRecord, expected_version: Version) -> Self {
        Self {
            kind: ChangeKind::Update,
            record,
            expected_version: Some(expected_version),
        }
    }

    /// Creates a physical delete guarded by the version the writer loaded.
    pub fn delete(record: EntityRecord, expected_version: Version) -> Self {
        Self {
            kind: ChangeKind::Delete,
            record,
            expected_version: Some(expected_version),
        }
    }

    /// Returns the `(entity_type, id)` pair this change targets.
    pub fn target(&self) -> (&str, AggregateId) {
        (&self.record.entity_type, self.record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn soft_delete_stamps_update_and_flag_together() {
        let mut audit = AuditInfo::default();
        let at = Utc::now();
        audit.stamp_created(at, "alice");
        audit.stamp_deleted(at, "bob");

        assert!(audit.is_deleted);
        assert_eq!(audit.updated_at, Some(at));
        assert_eq!(audit.updated_by.as_deref(), Some("bob"));
        assert_eq!(audit.created_by.as_deref(), Some("alice"));
    }

    #[test]
    fn change_constructors_set_expected_version() {
        let record = EntityRecord::new(
            "Brand",
            AggregateId::new(),
            Version::first(),
            serde_json::json!({}),
        );

        assert_eq!(EntityChange::insert(record.clone()).expected_version, None);
        let update = EntityChange::update(record.clone(), Version::new(3));
        assert_eq!(update.kind, ChangeKind::Update);
        assert_eq!(update.expected_version, Some(Version::new(3)));
        assert_eq!(update.target(), ("Brand", record.id));
    }
}
