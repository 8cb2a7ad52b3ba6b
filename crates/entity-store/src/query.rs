use crate::{AggregateId, EntityRecord};

/// Filter and paging for listing stored entities.
///
/// Soft-deleted rows are excluded unless `include_deleted` is set.
/// Results come back in insertion order.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    pub entity_type: Option<String>,
    pub ids: Option<Vec<AggregateId>>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// All live entities of one type.
    pub fn for_type(entity_type: impl Into<String>) -> Self {
        Self::new().entity_type(entity_type)
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn ids(mut self, ids: Vec<AggregateId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether `record` passes the filters. Paging is applied separately.
    pub fn matches(&self, record: &EntityRecord) -> bool {
        if record.is_deleted() && !self.include_deleted {
            return false;
        }
        let type_ok = self
            .entity_type
            .as_deref()
            .is_none_or(|t| t == record.entity_type);
        let id_ok = self.ids.as_ref().is_none_or(|ids| ids.contains(&record.id));
        type_ok && id_ok
    }

    /// `(skip, take)` for the requested page.
    pub fn window(&self) -> (usize, usize) {
        (self.offset.unwrap_or(0), self.limit.unwrap_or(usize::MAX))
    }
}
