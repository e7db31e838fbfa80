//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the record store contract the merge run consumes.
//! - Isolate SQLite query details from grouping and merge orchestration.
//!
//! # Invariants
//! - Read paths validate persisted rows before handing them out.
//! - The store refuses to delete protected positions on its own.

pub mod position_repo;
