//! Position domain model.
//!
//! # Responsibility
//! - Define the assignment of a person to an organization for one period.
//! - Derive the identity key that is supposed to be unique per position.
//!
//! # Invariants
//! - `id` is unique and never reused within a run.
//! - `is_admin` positions are never deleted by the merge run.
//! - Lower `rank` means more senior.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable identifier of one position row.
pub type PositionId = i64;

/// Identifier of the person holding a position.
pub type PersonId = i64;

/// Identifier of the organization a position belongs to.
pub type OrgId = i64;

/// Academic period a position is held for.
///
/// Ordered by `year` first so grouped output reads chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    /// Free-form semester tag, e.g. `Fall` or `Spring`.
    pub semester: String,
}

impl Period {
    pub fn new(semester: impl Into<String>, year: i32) -> Self {
        Self {
            year,
            semester: semester.into(),
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.year, self.semester)
    }
}

/// Tuple that should identify at most one position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub person_id: PersonId,
    pub org_id: OrgId,
    pub period: Period,
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "person={} org={} period={}",
            self.person_id, self.org_id, self.period
        )
    }
}

/// One assignment of a person to an organization for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub person_id: PersonId,
    pub org_id: OrgId,
    pub period: Period,
    /// Seniority value; lower is more senior. Persisted as `pos`.
    pub rank: i64,
    /// Protected flag. Persisted as `is_admin`.
    pub is_admin: bool,
}

impl Position {
    pub fn new(
        id: PositionId,
        person_id: PersonId,
        org_id: OrgId,
        period: Period,
        rank: i64,
    ) -> Self {
        Self {
            id,
            person_id,
            org_id,
            period,
            rank,
            is_admin: false,
        }
    }

    /// Returns a copy flagged as protected.
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            person_id: self.person_id,
            org_id: self.org_id,
            period: self.period.clone(),
        }
    }

    /// Validates fields the store cannot enforce on its own.
    pub fn validate(&self) -> Result<(), PositionValidationError> {
        if self.period.semester.trim().is_empty() {
            return Err(PositionValidationError::BlankSemester(self.id));
        }
        Ok(())
    }
}

/// Validation errors for persisted position rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionValidationError {
    BlankSemester(PositionId),
}

impl Display for PositionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankSemester(id) => write!(f, "position {id} has a blank semester"),
        }
    }
}

impl Error for PositionValidationError {}

/// Human-facing names for one identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLabel {
    pub person_name: String,
    pub org_name: String,
    pub period: Period,
}

impl Display for GroupLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in {} ({} {})",
            self.person_name, self.org_name, self.period.year, self.period.semester
        )
    }
}

/// Positions sharing one identity key. Lives for one run only.
///
/// # Invariants
/// - Holds at least two positions.
/// - Every position's identity key equals `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    key: IdentityKey,
    positions: Vec<Position>,
}

impl DuplicateGroup {
    /// Builds a group, or `None` when the positions are not duplicates of `key`.
    pub fn new(key: IdentityKey, positions: Vec<Position>) -> Option<Self> {
        if positions.len() < 2 || positions.iter().any(|p| p.identity_key() != key) {
            return None;
        }
        Some(Self { key, positions })
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }
}

/// Decision for one group: keep `survivor`, delete everything in `deleted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub key: IdentityKey,
    pub survivor: Position,
    pub deleted: Vec<Position>,
}

impl MergePlan {
    pub fn deleted_ids(&self) -> Vec<PositionId> {
        self.deleted.iter().map(|position| position.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{DuplicateGroup, GroupLabel, Period, Position};

    #[test]
    fn identity_key_ignores_rank_and_flag() {
        let first = Position::new(1, 7, 9, Period::new("Fall", 2024), 3);
        let second = Position::new(2, 7, 9, Period::new("Fall", 2024), 1).admin();
        assert_eq!(first.identity_key(), second.identity_key());
    }

    #[test]
    fn validate_rejects_blank_semester() {
        let position = Position::new(4, 1, 1, Period::new("  ", 2024), 0);
        let err = position.validate().unwrap_err();
        assert_eq!(err.to_string(), "position 4 has a blank semester");
    }

    #[test]
    fn duplicate_group_requires_two_positions_with_same_key() {
        let first = Position::new(1, 1, 1, Period::new("Fall", 2024), 0);
        let same = Position::new(2, 1, 1, Period::new("Fall", 2024), 1);
        let other = Position::new(3, 1, 1, Period::new("Spring", 2024), 1);
        let key = first.identity_key();

        assert!(DuplicateGroup::new(key.clone(), vec![first.clone()]).is_none());
        assert!(DuplicateGroup::new(key.clone(), vec![first.clone(), other]).is_none());
        let group = DuplicateGroup::new(key, vec![first, same]).unwrap();
        assert_eq!(group.positions().len(), 2);
    }

    #[test]
    fn group_label_reads_like_a_sentence() {
        let label = GroupLabel {
            person_name: "Ada".to_string(),
            org_name: "Chess Club".to_string(),
            period: Period::new("Spring", 2025),
        };
        assert_eq!(label.to_string(), "Ada in Chess Club (2025 Spring)");
    }
}
