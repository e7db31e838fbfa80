//! Grouping engine: positions sharing an identity key.

use crate::model::position::{DuplicateGroup, IdentityKey, Position};
use std::collections::BTreeMap;

/// Groups positions by identity key, keeping only keys held more than once.
///
/// Groups come back in ascending key order; positions inside a group keep
/// their input order. Input order never changes which positions end up
/// grouped together.
pub fn find_duplicates(positions: impl IntoIterator<Item = Position>) -> Vec<DuplicateGroup> {
    let mut by_key: BTreeMap<IdentityKey, Vec<Position>> = BTreeMap::new();
    for position in positions {
        by_key
            .entry(position.identity_key())
            .or_default()
            .push(position);
    }

    by_key
        .into_iter()
        .filter_map(|(key, positions)| DuplicateGroup::new(key, positions))
        .collect()
}
