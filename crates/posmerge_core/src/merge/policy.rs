//! Merge policy: survivor selection and the protected-row guard.
//!
//! # Invariants
//! - Survivor is the position with the lowest `(rank, id)`.
//! - A plan never lists an `is_admin` position for deletion.
//! - A protected survivor is allowed.

use crate::model::position::{DuplicateGroup, IdentityKey, MergePlan, PositionId};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A group whose deletion candidates include protected positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionViolation {
    pub key: IdentityKey,
    pub protected_count: usize,
    pub protected_ids: Vec<PositionId>,
}

impl Display for ProtectionViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ids = self
            .protected_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "cannot delete admin positions for {}: {} admin position(s) would be deleted (ids {ids})",
            self.key, self.protected_count
        )
    }
}

impl Error for ProtectionViolation {}

/// Decides which position of `group` survives and which ones are deleted.
///
/// Returns a violation instead of a plan when any non-survivor is protected.
pub fn plan_group(group: &DuplicateGroup) -> Result<MergePlan, ProtectionViolation> {
    let mut ordered = group.positions().to_vec();
    ordered.sort_by_key(|position| (position.rank, position.id));

    // Groups always hold at least two positions.
    let survivor = ordered.remove(0);
    let deleted = ordered;

    let protected_ids: Vec<PositionId> = deleted
        .iter()
        .filter(|position| position.is_admin)
        .map(|position| position.id)
        .collect();
    if !protected_ids.is_empty() {
        return Err(ProtectionViolation {
            key: group.key().clone(),
            protected_count: protected_ids.len(),
            protected_ids,
        });
    }

    Ok(MergePlan {
        key: group.key().clone(),
        survivor,
        deleted,
    })
}
