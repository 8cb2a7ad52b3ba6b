use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a persisted entity.
///
/// Kept distinct from the UUIDs used for events and requests so the
/// compiler catches an id passed in the wrong position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Generates a fresh random (v4) id.
    pub fn new() -> Self {
        Uuid::new_v4().into()
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// All-zero placeholder. Validation treats it as "no id supplied".
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AggregateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<Uuid>().map(Self::from_uuid)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.as_uuid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct_and_never_nil() {
        let ids: Vec<AggregateId> = (0..16).map(|_| AggregateId::new()).collect();
        for (i, a) in ids.iter().enumerate() {
            assert!(!a.is_nil());
            assert!(ids[i + 1..].iter().all(|b| b != a));
        }
    }

    #[test]
    fn display_and_parse_agree() {
        let id = AggregateId::new();
        let parsed: AggregateId = format!(" {id} ").parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(Uuid::from(parsed), id.as_uuid());
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!("brand-42".parse::<AggregateId>().is_err());
        assert!("".parse::<AggregateId>().is_err());
    }

    #[test]
    fn nil_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&AggregateId::nil()).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");

        let back: AggregateId = serde_json::from_str(&json).unwrap();
        assert!(back.is_nil());
    }
}
