//! Human-readable progress output for merge runs.

use posmerge_core::{
    GroupLabel, IdentityKey, MergeError, MergeReporter, PositionId, RunMode, RunState, RunSummary,
};
use std::io::Write;

/// Writes run progress as plain text.
///
/// Progress goes to `out`, failures to `err`. Write errors are ignored so a
/// closed pipe never changes the outcome of a run.
pub struct ConsoleReporter<O: Write, E: Write> {
    out: O,
    err: E,
    quiet: bool,
}

impl<O: Write, E: Write> ConsoleReporter<O, E> {
    pub fn new(out: O, err: E, quiet: bool) -> Self {
        Self { out, err, quiet }
    }

    #[cfg(test)]
    fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

impl<O: Write, E: Write> MergeReporter for ConsoleReporter<O, E> {
    fn on_duplicates_found(&mut self, group_count: usize) {
        if self.quiet || group_count == 0 {
            return;
        }
        let _ = writeln!(self.out, "Found {group_count} groups of duplicate positions.");
    }

    fn on_group_found(&mut self, key: &IdentityKey, label: Option<&GroupLabel>, record_count: usize) {
        if self.quiet {
            return;
        }
        let display = match label {
            Some(label) => label.to_string(),
            None => key.to_string(),
        };
        let _ = writeln!(self.out, "\nProcessing group: {display}");
        let _ = writeln!(self.out, "  Found {record_count} duplicate positions");
    }

    fn on_survivor_chosen(
        &mut self,
        _key: &IdentityKey,
        survivor_id: PositionId,
        survivor_rank: i64,
        deleted_ids: &[PositionId],
    ) {
        if self.quiet {
            return;
        }
        let _ = writeln!(
            self.out,
            "  Keeping position ID {survivor_id} with pos={survivor_rank}"
        );
        let _ = writeln!(
            self.out,
            "  Deleting {} duplicate positions",
            deleted_ids.len()
        );
    }

    fn on_violation(&mut self, key: &IdentityKey, protected_count: usize) {
        let _ = writeln!(
            self.err,
            "  ERROR: Found {protected_count} admin positions to delete in group {key}!"
        );
    }

    fn on_run_summary(&mut self, summary: &RunSummary) {
        if self.quiet {
            return;
        }
        if summary.duplicate_groups == 0 {
            let _ = writeln!(self.out, "No duplicate positions found.");
            return;
        }
        let _ = match summary.mode {
            RunMode::DryRun => writeln!(
                self.out,
                "\nDRY RUN SUMMARY: Would merge {} groups and delete {} duplicate positions",
                summary.groups_merged, summary.records_deleted
            ),
            RunMode::Apply => writeln!(
                self.out,
                "\nSUCCESS: Merged {} groups and deleted {} duplicate positions",
                summary.groups_merged, summary.records_deleted
            ),
        };
    }

    fn on_run_failed(&mut self, _mode: RunMode, state: RunState, error: &MergeError) {
        let _ = writeln!(self.err, "error: {error}");
        let confirmation = match state {
            RunState::RolledBack => "Rolled back entire transaction; no changes were persisted.",
            _ => "No changes were attempted.",
        };
        let _ = writeln!(self.err, "{confirmation}");
    }
}
