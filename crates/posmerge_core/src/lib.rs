//! Core logic for reconciling duplicate positions.
//! This crate owns the grouping, survivor selection and protection invariants.

pub mod db;
pub mod logging;
pub mod merge;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{
    default_log_level, init_logging, logging_status, parse_log_level, LoggingError,
};
pub use merge::grouping::find_duplicates;
pub use merge::policy::{plan_group, ProtectionViolation};
pub use merge::report::{LogReporter, MergeEvent, MergeReporter, RecordingReporter};
pub use model::position::{
    DuplicateGroup, GroupLabel, IdentityKey, MergePlan, OrgId, Period, PersonId, Position,
    PositionId, PositionValidationError,
};
pub use repo::position_repo::{PositionStore, SqlitePositionStore, StoreError, StoreResult};
pub use service::merge_service::{
    MergeError, MergeService, RunMode, RunOutcome, RunState, RunSummary, SimulatedTransaction,
    StoreTransaction, TransactionStrategy,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
