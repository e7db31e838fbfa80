//! Merge run coordinator.
//!
//! # Responsibility
//! - Drive grouping, merge planning and deletion for one whole run.
//! - Apply every deletion inside a single exclusive transaction, or only
//!   simulate them in dry-run mode.
//!
//! # Invariants
//! - A run either commits every planned deletion or leaves storage as it was.
//! - The first violation or store failure terminates the run.
//! - Dry runs never open a transaction and never issue a delete.
//! - Both modes share the same loop; only the `TransactionStrategy` differs.

use crate::merge::grouping::find_duplicates;
use crate::merge::policy::{plan_group, ProtectionViolation};
use crate::merge::report::MergeReporter;
use crate::model::position::PositionId;
use crate::repo::position_repo::{PositionStore, StoreError, StoreResult};
use log::{error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Whether a run mutates storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Delete duplicates inside one exclusive transaction.
    Apply,
    /// Report what would be deleted without touching storage.
    DryRun,
}

impl RunMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else {
            Self::Apply
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::DryRun => "dry_run",
        }
    }
}

/// Lifecycle of one run: `Start -> Processing -> {Committed | RolledBack | Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    Processing,
    /// Every group processed; deletions durable (apply) or counted (dry run).
    Committed,
    /// Failed inside the run transaction; all deletions were undone.
    RolledBack,
    /// Failed with no transaction open; storage was never touched.
    Aborted,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Processing => "processing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Aborted)
    }

    /// Returns whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Start, Self::Processing)
                | (Self::Start, Self::Aborted)
                | (Self::Processing, Self::Committed)
                | (Self::Processing, Self::RolledBack)
                | (Self::Processing, Self::Aborted)
        )
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    /// Duplicate groups found; zero means the data was already clean.
    pub duplicate_groups: usize,
    pub groups_merged: usize,
    /// Deleted (apply) or would-delete (dry run) positions.
    pub records_deleted: usize,
}

impl RunSummary {
    fn empty(mode: RunMode) -> Self {
        Self {
            mode,
            duplicate_groups: 0,
            groups_merged: 0,
            records_deleted: 0,
        }
    }
}

/// Fatal merge run errors. None of them is retried.
#[derive(Debug)]
pub enum MergeError {
    /// Positions could not be enumerated or described.
    StoreUnavailable(StoreError),
    /// A deletion candidate is protected.
    ProtectionViolation(ProtectionViolation),
    /// The store rejected one deletion.
    DeleteFailed { id: PositionId, cause: StoreError },
    /// The run transaction could not be opened or committed.
    TransactionFailed(StoreError),
}

impl MergeError {
    /// Stable machine-readable code used in logs and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ProtectionViolation(_) => "protection_violation",
            Self::DeleteFailed { .. } => "delete_failed",
            Self::TransactionFailed(_) => "transaction_failed",
        }
    }
}

impl Display for MergeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreUnavailable(err) => write!(f, "record store unavailable: {err}"),
            Self::ProtectionViolation(violation) => write!(f, "{violation}"),
            Self::DeleteFailed { id, cause } => {
                write!(f, "failed to delete position {id}: {cause}")
            }
            Self::TransactionFailed(err) => write!(f, "run transaction failed: {err}"),
        }
    }
}

impl Error for MergeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            Self::ProtectionViolation(violation) => Some(violation),
            Self::DeleteFailed { cause, .. } => Some(cause),
            Self::TransactionFailed(err) => Some(err),
        }
    }
}

/// Final result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub mode: RunMode,
    /// Always terminal.
    pub state: RunState,
    /// Zero merged/deleted whenever `error` is set.
    pub summary: RunSummary,
    pub error: Option<MergeError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<RunSummary, MergeError> {
        match self.error {
            None => Ok(self.summary),
            Some(err) => Err(err),
        }
    }
}

/// How a run brackets its deletions.
pub trait TransactionStrategy {
    fn mode(&self) -> RunMode;
    fn begin(&self, store: &dyn PositionStore) -> StoreResult<()>;
    fn delete(&self, store: &dyn PositionStore, id: PositionId) -> StoreResult<()>;
    fn commit(&self, store: &dyn PositionStore) -> StoreResult<()>;
    /// Undoes everything since `begin` and returns the terminal failure state.
    fn rollback(&self, store: &dyn PositionStore) -> StoreResult<RunState>;
}

/// Real exclusive transaction through the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreTransaction;

impl TransactionStrategy for StoreTransaction {
    fn mode(&self) -> RunMode {
        RunMode::Apply
    }

    fn begin(&self, store: &dyn PositionStore) -> StoreResult<()> {
        store.begin_transaction()
    }

    fn delete(&self, store: &dyn PositionStore, id: PositionId) -> StoreResult<()> {
        store.delete_position(id)
    }

    fn commit(&self, store: &dyn PositionStore) -> StoreResult<()> {
        store.commit()
    }

    fn rollback(&self, store: &dyn PositionStore) -> StoreResult<RunState> {
        store.rollback()?;
        Ok(RunState::RolledBack)
    }
}

/// No transaction, no deletes; deletions are only counted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedTransaction;

impl TransactionStrategy for SimulatedTransaction {
    fn mode(&self) -> RunMode {
        RunMode::DryRun
    }

    fn begin(&self, _store: &dyn PositionStore) -> StoreResult<()> {
        Ok(())
    }

    fn delete(&self, _store: &dyn PositionStore, _id: PositionId) -> StoreResult<()> {
        Ok(())
    }

    fn commit(&self, _store: &dyn PositionStore) -> StoreResult<()> {
        Ok(())
    }

    fn rollback(&self, _store: &dyn PositionStore) -> StoreResult<RunState> {
        Ok(RunState::Aborted)
    }
}

/// Use-case service running duplicate merges against one store.
pub struct MergeService<S: PositionStore> {
    store: S,
}

impl<S: PositionStore> MergeService<S> {
    /// Creates a service over the provided store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one merge in `mode`.
    pub fn run(&self, mode: RunMode, reporter: &mut dyn MergeReporter) -> RunOutcome {
        match mode {
            RunMode::Apply => self.run_with(&StoreTransaction, reporter),
            RunMode::DryRun => self.run_with(&SimulatedTransaction, reporter),
        }
    }

    /// Runs one merge bracketed by `strategy`.
    pub fn run_with<T: TransactionStrategy + ?Sized>(
        &self,
        strategy: &T,
        reporter: &mut dyn MergeReporter,
    ) -> RunOutcome {
        let store: &dyn PositionStore = &self.store;
        let mode = strategy.mode();
        let started_at = Instant::now();
        let mut state = RunState::Start;
        info!(
            "event=merge_run module=service status=start mode={}",
            mode.as_str()
        );

        if let Err(err) = strategy.begin(store) {
            advance(&mut state, RunState::Aborted);
            return fail(mode, state, MergeError::TransactionFailed(err), reporter, started_at);
        }
        advance(&mut state, RunState::Processing);

        let error = match process_groups(strategy, store, reporter) {
            Ok(summary) => match strategy.commit(store) {
                Ok(()) => {
                    advance(&mut state, RunState::Committed);
                    info!(
                        "event=merge_commit module=service status=ok mode={} duration_ms={} groups_merged={} records_deleted={}",
                        mode.as_str(),
                        started_at.elapsed().as_millis(),
                        summary.groups_merged,
                        summary.records_deleted
                    );
                    reporter.on_run_summary(&summary);
                    return RunOutcome {
                        mode,
                        state,
                        summary,
                        error: None,
                    };
                }
                Err(err) => MergeError::TransactionFailed(err),
            },
            Err(error) => error,
        };

        advance(&mut state, roll_back(strategy, store, mode));
        fail(mode, state, error, reporter, started_at)
    }
}

/// Undoes the run through `strategy`, returning the terminal failure state.
///
/// A store that already discarded its transaction (rusqlite drops it on a
/// failed commit) reports the rollback error; it is logged, not surfaced.
fn roll_back<T: TransactionStrategy + ?Sized>(
    strategy: &T,
    store: &dyn PositionStore,
    mode: RunMode,
) -> RunState {
    match strategy.rollback(store) {
        Ok(terminal) => terminal,
        Err(err) => {
            error!(
                "event=merge_rollback module=service status=error mode={} error={}",
                mode.as_str(),
                err
            );
            failed_state(mode)
        }
    }
}

fn process_groups<T: TransactionStrategy + ?Sized>(
    strategy: &T,
    store: &dyn PositionStore,
    reporter: &mut dyn MergeReporter,
) -> Result<RunSummary, MergeError> {
    let positions = store
        .list_positions()
        .map_err(MergeError::StoreUnavailable)?;
    let groups = find_duplicates(positions);

    let mut summary = RunSummary::empty(strategy.mode());
    summary.duplicate_groups = groups.len();
    reporter.on_duplicates_found(groups.len());
    if groups.is_empty() {
        info!(
            "event=merge_run module=service status=clean mode={}",
            strategy.mode().as_str()
        );
        return Ok(summary);
    }

    for group in &groups {
        let label = store
            .group_label(group.key())
            .map_err(MergeError::StoreUnavailable)?;
        reporter.on_group_found(group.key(), label.as_ref(), group.positions().len());

        let plan = match plan_group(group) {
            Ok(plan) => plan,
            Err(violation) => {
                reporter.on_violation(&violation.key, violation.protected_count);
                return Err(MergeError::ProtectionViolation(violation));
            }
        };
        reporter.on_survivor_chosen(
            &plan.key,
            plan.survivor.id,
            plan.survivor.rank,
            &plan.deleted_ids(),
        );

        for position in &plan.deleted {
            strategy
                .delete(store, position.id)
                .map_err(|cause| MergeError::DeleteFailed {
                    id: position.id,
                    cause,
                })?;
            summary.records_deleted += 1;
        }
        summary.groups_merged += 1;
    }

    Ok(summary)
}

fn fail(
    mode: RunMode,
    state: RunState,
    error: MergeError,
    reporter: &mut dyn MergeReporter,
    started_at: Instant,
) -> RunOutcome {
    warn!(
        "event=merge_run module=service status=error mode={} state={} duration_ms={} error_code={}",
        mode.as_str(),
        state.as_str(),
        started_at.elapsed().as_millis(),
        error.code()
    );
    reporter.on_run_failed(mode, state, &error);
    RunOutcome {
        mode,
        state,
        summary: RunSummary::empty(mode),
        error: Some(error),
    }
}

fn failed_state(mode: RunMode) -> RunState {
    match mode {
        RunMode::Apply => RunState::RolledBack,
        RunMode::DryRun => RunState::Aborted,
    }
}

fn advance(state: &mut RunState, next: RunState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal run transition {} -> {}",
        state.as_str(),
        next.as_str()
    );
    *state = next;
}
