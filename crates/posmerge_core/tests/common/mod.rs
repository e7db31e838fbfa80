#![allow(dead_code)]

use posmerge_core::{
    GroupLabel, IdentityKey, Period, Position, PositionId, PositionStore, StoreError, StoreResult,
};
use rusqlite::{params, Connection};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

pub fn seed_person(conn: &Connection, id: i64, name: &str) {
    conn.execute(
        "INSERT INTO persons (id, name) VALUES (?1, ?2);",
        params![id, name],
    )
    .unwrap();
}

pub fn seed_org(conn: &Connection, id: i64, name: &str) {
    conn.execute(
        "INSERT INTO organizations (id, name) VALUES (?1, ?2);",
        params![id, name],
    )
    .unwrap();
}

pub fn seed_position(conn: &Connection, position: &Position) {
    conn.execute(
        "INSERT INTO positions (id, person_id, org_id, semester, year, pos, is_admin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            position.id,
            position.person_id,
            position.org_id,
            position.period.semester,
            position.period.year,
            position.rank,
            i64::from(position.is_admin),
        ],
    )
    .unwrap();
}

/// Seeds persons 1..=3 and organizations 10..=11 so positions can reference them.
pub fn seed_directory(conn: &Connection) {
    seed_person(conn, 1, "Ada Lovelace");
    seed_person(conn, 2, "Grace Hopper");
    seed_person(conn, 3, "Alan Turing");
    seed_org(conn, 10, "Chess Club");
    seed_org(conn, 11, "Robotics Society");
}

pub fn fall_2024() -> Period {
    Period::new("Fall", 2024)
}

pub fn position(id: PositionId, person_id: i64, rank: i64) -> Position {
    Position::new(id, person_id, 10, fall_2024(), rank)
}

pub fn position_ids(conn: &Connection) -> Vec<PositionId> {
    let mut stmt = conn
        .prepare("SELECT id FROM positions ORDER BY id ASC;")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// In-memory store with snapshot transactions and injectable failures.
#[derive(Default)]
pub struct MemoryStore {
    rows: RefCell<BTreeMap<PositionId, Position>>,
    snapshot: RefCell<Option<BTreeMap<PositionId, Position>>>,
    pub fail_list: bool,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_delete: Option<PositionId>,
    pub deletes: RefCell<Vec<PositionId>>,
    pub begins: Cell<usize>,
    pub commits: Cell<usize>,
    pub rollbacks: Cell<usize>,
}

impl MemoryStore {
    pub fn with_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        let store = Self::default();
        for position in positions {
            store.rows.borrow_mut().insert(position.id, position);
        }
        store
    }

    pub fn ids(&self) -> Vec<PositionId> {
        self.rows.borrow().keys().copied().collect()
    }
}

impl PositionStore for MemoryStore {
    fn list_positions(&self) -> StoreResult<Vec<Position>> {
        if self.fail_list {
            return Err(StoreError::InvalidData("store offline".to_string()));
        }
        Ok(self.rows.borrow().values().cloned().collect())
    }

    fn delete_position(&self, id: PositionId) -> StoreResult<()> {
        self.deletes.borrow_mut().push(id);
        if self.fail_delete == Some(id) {
            return Err(StoreError::InvalidData(format!("disk full deleting {id}")));
        }
        let mut rows = self.rows.borrow_mut();
        match rows.get(&id) {
            None => Err(StoreError::NotFound(id)),
            Some(position) if position.is_admin => Err(StoreError::ProtectedRecord(id)),
            Some(_) => {
                rows.remove(&id);
                Ok(())
            }
        }
    }

    fn group_label(&self, key: &IdentityKey) -> StoreResult<Option<GroupLabel>> {
        Ok(Some(GroupLabel {
            person_name: format!("person-{}", key.person_id),
            org_name: format!("org-{}", key.org_id),
            period: key.period.clone(),
        }))
    }

    fn begin_transaction(&self) -> StoreResult<()> {
        if self.fail_begin {
            return Err(StoreError::InvalidData("database is locked".to_string()));
        }
        let mut snapshot = self.snapshot.borrow_mut();
        if snapshot.is_some() {
            return Err(StoreError::TransactionAlreadyActive);
        }
        *snapshot = Some(self.rows.borrow().clone());
        self.begins.set(self.begins.get() + 1);
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        if self.fail_commit {
            return Err(StoreError::InvalidData("commit refused".to_string()));
        }
        self.snapshot
            .borrow_mut()
            .take()
            .ok_or(StoreError::NoActiveTransaction)?;
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let snapshot = self
            .snapshot
            .borrow_mut()
            .take()
            .ok_or(StoreError::NoActiveTransaction)?;
        *self.rows.borrow_mut() = snapshot;
        self.rollbacks.set(self.rollbacks.get() + 1);
        Ok(())
    }
}
