//! Duplicate detection and merge selection.
//!
//! # Responsibility
//! - Partition positions into duplicate groups by identity key.
//! - Pick one deterministic survivor per group and guard protected rows.
//! - Define the reporter contract merge runs emit progress through.
//!
//! # Invariants
//! - Everything here is pure over in-memory data; storage effects belong to
//!   `service::merge_service`.

pub mod grouping;
pub mod policy;
pub mod report;
