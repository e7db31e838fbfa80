mod common;

use common::{position, position_ids, seed_directory, seed_position};
use posmerge_core::db::open_db_in_memory;
use posmerge_core::{
    MergeError, MergeEvent, MergeService, Period, Position, RecordingReporter, RunMode, RunState,
    SqlitePositionStore,
};
use rusqlite::Connection;
use std::collections::BTreeSet;

fn seeded(positions: &[Position]) -> Connection {
    let conn = open_db_in_memory().unwrap();
    seed_directory(&conn);
    for position in positions {
        seed_position(&conn, position);
    }
    conn
}

fn run(conn: &Connection, mode: RunMode) -> (posmerge_core::RunOutcome, RecordingReporter) {
    let store = SqlitePositionStore::try_new(conn).unwrap();
    let service = MergeService::new(store);
    let mut reporter = RecordingReporter::new();
    let outcome = service.run(mode, &mut reporter);
    (outcome, reporter)
}

fn violating_group() -> Vec<Position> {
    vec![position(1, 1, 3), position(2, 1, 1), position(3, 1, 2).admin()]
}

fn clean_group() -> Vec<Position> {
    vec![position(1, 1, 3), position(2, 1, 1), position(3, 1, 2)]
}

#[test]
fn protected_candidate_aborts_run_and_deletes_nothing() {
    let conn = seeded(&violating_group());

    let (outcome, reporter) = run(&conn, RunMode::Apply);

    assert_eq!(outcome.state, RunState::RolledBack);
    match outcome.error {
        Some(MergeError::ProtectionViolation(ref violation)) => {
            assert_eq!(violation.key, position(1, 1, 0).identity_key());
            assert_eq!(violation.protected_count, 1);
            assert_eq!(violation.protected_ids, vec![3]);
        }
        ref other => panic!("unexpected outcome error: {other:?}"),
    }
    assert_eq!(
        reporter.violations(),
        vec![(position(1, 1, 0).identity_key(), 1)]
    );
    assert!(reporter.survivors().is_empty());
    assert_eq!(position_ids(&conn), vec![1, 2, 3]);
}

#[test]
fn clean_group_keeps_lowest_rank_and_deletes_the_rest() {
    let conn = seeded(&clean_group());

    let (outcome, reporter) = run(&conn, RunMode::Apply);
    let summary = outcome.into_result().unwrap();

    assert_eq!(summary.mode, RunMode::Apply);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.groups_merged, 1);
    assert_eq!(summary.records_deleted, 2);
    assert_eq!(reporter.survivors(), vec![2]);
    assert_eq!(position_ids(&conn), vec![2]);
}

#[test]
fn events_arrive_in_run_order() {
    let conn = seeded(&clean_group());

    let (_, reporter) = run(&conn, RunMode::Apply);
    let key = position(1, 1, 0).identity_key();

    assert_eq!(reporter.events().len(), 4);
    assert_eq!(
        reporter.events()[0],
        MergeEvent::DuplicatesFound { group_count: 1 }
    );
    match &reporter.events()[1] {
        MergeEvent::GroupFound {
            key: found,
            label,
            record_count,
        } => {
            assert_eq!(found, &key);
            assert_eq!(*record_count, 3);
            assert_eq!(
                label.as_ref().unwrap().to_string(),
                "Ada Lovelace in Chess Club (2024 Fall)"
            );
        }
        other => panic!("unexpected group event: {other:?}"),
    }
    assert_eq!(
        reporter.events()[2],
        MergeEvent::SurvivorChosen {
            key,
            survivor_id: 2,
            survivor_rank: 1,
            deleted_ids: vec![3, 1],
        }
    );
    assert!(matches!(reporter.events()[3], MergeEvent::RunSummary(_)));
}

#[test]
fn protected_survivor_is_kept() {
    let conn = seeded(&[position(1, 1, 0).admin(), position(2, 1, 4)]);

    let (outcome, _) = run(&conn, RunMode::Apply);

    assert_eq!(outcome.state, RunState::Committed);
    assert_eq!(position_ids(&conn), vec![1]);
}

#[test]
fn violation_after_merged_group_rolls_back_everything() {
    let conn = seeded(&[
        position(1, 1, 0),
        position(2, 1, 1),
        position(3, 2, 0),
        position(4, 2, 1).admin(),
        Position::new(5, 3, 11, Period::new("Spring", 2025), 0),
        Position::new(6, 3, 11, Period::new("Spring", 2025), 0),
    ]);

    let (outcome, reporter) = run(&conn, RunMode::Apply);

    assert_eq!(outcome.state, RunState::RolledBack);
    assert!(matches!(
        outcome.error,
        Some(MergeError::ProtectionViolation(_))
    ));
    assert_eq!(outcome.summary.records_deleted, 0);
    assert_eq!(reporter.survivors(), vec![1]);
    assert_eq!(position_ids(&conn), vec![1, 2, 3, 4, 5, 6]);
    match reporter.events().last().unwrap() {
        MergeEvent::RunFailed { mode, state, .. } => {
            assert_eq!(*mode, RunMode::Apply);
            assert_eq!(*state, RunState::RolledBack);
        }
        other => panic!("unexpected last event: {other:?}"),
    }
}

#[test]
fn second_apply_run_finds_no_duplicates() {
    let conn = seeded(&[
        position(1, 1, 2),
        position(2, 1, 2),
        position(3, 2, 5),
        position(4, 2, 1),
        position(5, 3, 0),
    ]);

    let first = run(&conn, RunMode::Apply).0.into_result().unwrap();
    assert_eq!(first.groups_merged, 2);
    assert_eq!(first.records_deleted, 2);
    assert_eq!(position_ids(&conn), vec![1, 4, 5]);

    let second = run(&conn, RunMode::Apply).0.into_result().unwrap();
    assert_eq!(second.duplicate_groups, 0);
    assert_eq!(second.records_deleted, 0);
    assert_eq!(position_ids(&conn), vec![1, 4, 5]);
}

#[test]
fn dry_run_reports_same_counts_without_touching_storage() {
    let positions = [
        position(1, 1, 2),
        position(2, 1, 2),
        position(3, 1, 7),
        position(4, 2, 1),
        position(5, 2, 0),
    ];
    let dry_conn = seeded(&positions);
    let apply_conn = seeded(&positions);

    let (dry_outcome, dry_reporter) = run(&dry_conn, RunMode::DryRun);
    let (apply_outcome, apply_reporter) = run(&apply_conn, RunMode::Apply);
    let dry = dry_outcome.into_result().unwrap();
    let applied = apply_outcome.into_result().unwrap();

    assert_eq!(dry.mode, RunMode::DryRun);
    assert_eq!(dry.duplicate_groups, applied.duplicate_groups);
    assert_eq!(dry.groups_merged, applied.groups_merged);
    assert_eq!(dry.records_deleted, applied.records_deleted);
    assert_eq!(dry_reporter.survivors(), apply_reporter.survivors());
    assert_eq!(position_ids(&dry_conn), vec![1, 2, 3, 4, 5]);
}

#[test]
fn dry_run_violation_aborts_with_no_storage_effect() {
    let conn = seeded(&violating_group());

    let (outcome, reporter) = run(&conn, RunMode::DryRun);

    assert_eq!(outcome.mode, RunMode::DryRun);
    assert_eq!(outcome.state, RunState::Aborted);
    assert!(matches!(
        outcome.error,
        Some(MergeError::ProtectionViolation(_))
    ));
    assert_eq!(reporter.violations().len(), 1);
    assert_eq!(position_ids(&conn), vec![1, 2, 3]);
}

#[test]
fn empty_store_is_a_clean_run() {
    let conn = seeded(&[]);

    let (outcome, reporter) = run(&conn, RunMode::Apply);
    let summary = outcome.into_result().unwrap();

    assert_eq!(summary.duplicate_groups, 0);
    assert_eq!(
        reporter.events()[0],
        MergeEvent::DuplicatesFound { group_count: 0 }
    );
    assert_eq!(reporter.events().len(), 2);
}

#[test]
fn merged_runs_never_delete_admins_and_leave_keys_unique() {
    // Deterministic pseudo-random datasets over a small key space.
    let mut seed: u64 = 0x5eed;
    let mut next = move |bound: u64| {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (seed >> 33) % bound
    };

    for _ in 0..40 {
        let mut positions = Vec::new();
        for id in 1..=12 {
            let person_id = next(3) as i64 + 1;
            let semester = if next(2) == 0 { "Fall" } else { "Spring" };
            let mut position = Position::new(
                id,
                person_id,
                10,
                Period::new(semester, 2024),
                next(4) as i64,
            );
            if next(6) == 0 {
                position = position.admin();
            }
            positions.push(position);
        }
        let conn = seeded(&positions);
        let admins: BTreeSet<i64> = positions
            .iter()
            .filter(|p| p.is_admin)
            .map(|p| p.id)
            .collect();

        let (outcome, _) = run(&conn, RunMode::Apply);
        let remaining: BTreeSet<i64> = position_ids(&conn).into_iter().collect();

        assert!(admins.is_subset(&remaining));
        if outcome.is_success() {
            let store = SqlitePositionStore::try_new(&conn).unwrap();
            let keys: Vec<_> = posmerge_core::PositionStore::list_positions(&store)
                .unwrap()
                .iter()
                .map(Position::identity_key)
                .collect();
            let unique: BTreeSet<_> = keys.iter().cloned().collect();
            assert_eq!(keys.len(), unique.len());
        } else {
            assert_eq!(outcome.state, RunState::RolledBack);
            assert_eq!(remaining.len(), positions.len());
        }
    }
}
