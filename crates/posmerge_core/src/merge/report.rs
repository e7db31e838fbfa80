//! Reporter contract for merge run progress.
//!
//! # Responsibility
//! - Carry structured run events to a side channel (console, log, tests).
//! - Keep text formatting out of core.

use crate::model::position::{GroupLabel, IdentityKey, PositionId};
use crate::service::merge_service::{MergeError, RunMode, RunState, RunSummary};
use log::{error, info, warn};

/// Receives structured events while a merge run progresses.
pub trait MergeReporter {
    /// Grouping finished; `group_count` duplicate groups will be processed.
    fn on_duplicates_found(&mut self, group_count: usize);
    /// A duplicate group was found.
    fn on_group_found(&mut self, key: &IdentityKey, label: Option<&GroupLabel>, record_count: usize);
    /// A survivor was chosen and the remaining positions are slated for deletion.
    fn on_survivor_chosen(
        &mut self,
        key: &IdentityKey,
        survivor_id: PositionId,
        survivor_rank: i64,
        deleted_ids: &[PositionId],
    );
    /// Deletion candidates of a group include protected positions.
    fn on_violation(&mut self, key: &IdentityKey, protected_count: usize);
    /// The run finished without failure.
    fn on_run_summary(&mut self, summary: &RunSummary);
    /// The run terminated; `state` tells whether anything had to be rolled back.
    fn on_run_failed(&mut self, mode: RunMode, state: RunState, error: &MergeError);
}

/// Reporter that writes metadata-only log events.
#[derive(Debug, Default)]
pub struct LogReporter;

impl MergeReporter for LogReporter {
    fn on_duplicates_found(&mut self, group_count: usize) {
        info!("event=merge_scan module=merge status=ok group_count={group_count}");
    }

    fn on_group_found(&mut self, key: &IdentityKey, _label: Option<&GroupLabel>, record_count: usize) {
        info!(
            "event=merge_group module=merge status=found person_id={} org_id={} year={} semester={} record_count={}",
            key.person_id, key.org_id, key.period.year, key.period.semester, record_count
        );
    }

    fn on_survivor_chosen(
        &mut self,
        key: &IdentityKey,
        survivor_id: PositionId,
        survivor_rank: i64,
        deleted_ids: &[PositionId],
    ) {
        info!(
            "event=merge_group module=merge status=planned person_id={} org_id={} survivor_id={} survivor_rank={} delete_count={}",
            key.person_id,
            key.org_id,
            survivor_id,
            survivor_rank,
            deleted_ids.len()
        );
    }

    fn on_violation(&mut self, key: &IdentityKey, protected_count: usize) {
        warn!(
            "event=merge_violation module=merge status=error person_id={} org_id={} year={} semester={} protected_count={}",
            key.person_id, key.org_id, key.period.year, key.period.semester, protected_count
        );
    }

    fn on_run_summary(&mut self, summary: &RunSummary) {
        info!(
            "event=merge_summary module=merge status=ok mode={} duplicate_groups={} groups_merged={} records_deleted={}",
            summary.mode.as_str(),
            summary.duplicate_groups,
            summary.groups_merged,
            summary.records_deleted
        );
    }

    fn on_run_failed(&mut self, mode: RunMode, state: RunState, error: &MergeError) {
        error!(
            "event=merge_summary module=merge status=error mode={} state={} error_code={} error={}",
            mode.as_str(),
            state.as_str(),
            error.code(),
            error
        );
    }
}

/// One recorded reporter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeEvent {
    DuplicatesFound {
        group_count: usize,
    },
    GroupFound {
        key: IdentityKey,
        label: Option<GroupLabel>,
        record_count: usize,
    },
    SurvivorChosen {
        key: IdentityKey,
        survivor_id: PositionId,
        survivor_rank: i64,
        deleted_ids: Vec<PositionId>,
    },
    Violation {
        key: IdentityKey,
        protected_count: usize,
    },
    RunSummary(RunSummary),
    RunFailed {
        mode: RunMode,
        state: RunState,
        message: String,
    },
}

/// Reporter that keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Vec<MergeEvent>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[MergeEvent] {
        &self.events
    }

    /// Survivor ids in the order they were chosen.
    pub fn survivors(&self) -> Vec<PositionId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                MergeEvent::SurvivorChosen { survivor_id, .. } => Some(*survivor_id),
                _ => None,
            })
            .collect()
    }

    pub fn violations(&self) -> Vec<(IdentityKey, usize)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                MergeEvent::Violation {
                    key,
                    protected_count,
                } => Some((key.clone(), *protected_count)),
                _ => None,
            })
            .collect()
    }
}

impl MergeReporter for RecordingReporter {
    fn on_duplicates_found(&mut self, group_count: usize) {
        self.events.push(MergeEvent::DuplicatesFound { group_count });
    }

    fn on_group_found(&mut self, key: &IdentityKey, label: Option<&GroupLabel>, record_count: usize) {
        self.events.push(MergeEvent::GroupFound {
            key: key.clone(),
            label: label.cloned(),
            record_count,
        });
    }

    fn on_survivor_chosen(
        &mut self,
        key: &IdentityKey,
        survivor_id: PositionId,
        survivor_rank: i64,
        deleted_ids: &[PositionId],
    ) {
        self.events.push(MergeEvent::SurvivorChosen {
            key: key.clone(),
            survivor_id,
            survivor_rank,
            deleted_ids: deleted_ids.to_vec(),
        });
    }

    fn on_violation(&mut self, key: &IdentityKey, protected_count: usize) {
        self.events.push(MergeEvent::Violation {
            key: key.clone(),
            protected_count,
        });
    }

    fn on_run_summary(&mut self, summary: &RunSummary) {
        self.events.push(MergeEvent::RunSummary(summary.clone()));
    }

    fn on_run_failed(&mut self, mode: RunMode, state: RunState, error: &MergeError) {
        self.events.push(MergeEvent::RunFailed {
            mode,
            state,
            message: error.to_string(),
        });
    }
}
