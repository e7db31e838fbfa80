//! Domain model for position reconciliation.
//!
//! # Responsibility
//! - Define the position record and the identity key duplicates share.
//! - Define the transient shapes a merge run works with.
//!
//! # Invariants
//! - Every position is identified by a unique, ordered `PositionId`.
//! - Duplicate groups and merge plans never outlive one run.

pub mod position;
