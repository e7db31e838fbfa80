//! Position store contract and SQLite implementation.
//!
//! # Responsibility
//! - List every candidate position and delete individual positions.
//! - Scope a whole merge run inside one exclusive transaction.
//!
//! # Invariants
//! - `delete_position` never removes an `is_admin` row.
//! - An open transaction that is neither committed nor rolled back is
//!   rolled back when the store is dropped.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::position::{
    GroupLabel, IdentityKey, Period, Position, PositionId, PositionValidationError,
};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};

const POSITION_SELECT_SQL: &str = "SELECT
    id,
    person_id,
    org_id,
    semester,
    year,
    pos,
    is_admin
FROM positions";

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("persons", &["id", "name"]),
    ("organizations", &["id", "name"]),
    (
        "positions",
        &[
            "id",
            "person_id",
            "org_id",
            "semester",
            "year",
            "pos",
            "is_admin",
        ],
    ),
];

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from position store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target position does not exist.
    NotFound(PositionId),
    /// Target position is protected and must not be deleted.
    ProtectedRecord(PositionId),
    /// Persisted data cannot be converted to a valid position.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Commit or rollback was requested without an open transaction.
    NoActiveTransaction,
    /// A transaction is already open on this store.
    TransactionAlreadyActive,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "position not found: {id}"),
            Self::ProtectedRecord(id) => write!(f, "position {id} is protected (admin)"),
            Self::InvalidData(message) => write!(f, "invalid persisted position data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "position store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "position store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "position store requires column `{column}` in table `{table}`"
            ),
            Self::NoActiveTransaction => write!(f, "no active transaction"),
            Self::TransactionAlreadyActive => write!(f, "transaction already active"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<PositionValidationError> for StoreError {
    fn from(value: PositionValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Record store consumed by the merge run.
pub trait PositionStore {
    /// Lists every position, duplicates included.
    fn list_positions(&self) -> StoreResult<Vec<Position>>;
    /// Deletes one position by id.
    fn delete_position(&self, id: PositionId) -> StoreResult<()>;
    /// Resolves person and organization names for one identity key.
    fn group_label(&self, key: &IdentityKey) -> StoreResult<Option<GroupLabel>>;
    /// Opens the exclusive transaction covering one run.
    fn begin_transaction(&self) -> StoreResult<()>;
    /// Commits the open transaction.
    fn commit(&self) -> StoreResult<()>;
    /// Rolls back the open transaction.
    fn rollback(&self) -> StoreResult<()>;
}

/// SQLite-backed position store.
pub struct SqlitePositionStore<'conn> {
    conn: &'conn Connection,
    tx: RefCell<Option<Transaction<'conn>>>,
}

impl<'conn> SqlitePositionStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_position_connection_ready(conn)?;
        Ok(Self {
            conn,
            tx: RefCell::new(None),
        })
    }

    /// Returns whether a run transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.tx.borrow().is_some()
    }

    fn take_transaction(&self) -> StoreResult<Transaction<'conn>> {
        self.tx
            .borrow_mut()
            .take()
            .ok_or(StoreError::NoActiveTransaction)
    }
}

impl PositionStore for SqlitePositionStore<'_> {
    fn list_positions(&self) -> StoreResult<Vec<Position>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{POSITION_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut positions = Vec::new();

        while let Some(row) = rows.next()? {
            positions.push(parse_position_row(row)?);
        }

        Ok(positions)
    }

    fn delete_position(&self, id: PositionId) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM positions
             WHERE id = ?1
               AND is_admin = 0;",
            [id],
        )?;

        if changed == 1 {
            debug!("event=position_delete module=repo status=ok id={id}");
            return Ok(());
        }

        let is_admin: Option<i64> = self
            .conn
            .query_row(
                "SELECT is_admin FROM positions WHERE id = ?1;",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        match is_admin {
            None => Err(StoreError::NotFound(id)),
            Some(_) => Err(StoreError::ProtectedRecord(id)),
        }
    }

    fn group_label(&self, key: &IdentityKey) -> StoreResult<Option<GroupLabel>> {
        let names = self
            .conn
            .query_row(
                "SELECT p.name, o.name
                 FROM persons p, organizations o
                 WHERE p.id = ?1
                   AND o.id = ?2;",
                params![key.person_id, key.org_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        Ok(names.map(|(person_name, org_name)| GroupLabel {
            person_name,
            org_name,
            period: key.period.clone(),
        }))
    }

    fn begin_transaction(&self) -> StoreResult<()> {
        let mut slot = self.tx.borrow_mut();
        if slot.is_some() {
            return Err(StoreError::TransactionAlreadyActive);
        }
        *slot = Some(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Exclusive,
        )?);
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        self.take_transaction()?.commit()?;
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        self.take_transaction()?.rollback()?;
        Ok(())
    }
}

fn parse_position_row(row: &Row<'_>) -> StoreResult<Position> {
    let id: PositionId = row.get("id")?;
    let is_admin = match row.get::<_, i64>("is_admin")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_admin value `{other}` in positions.is_admin for id {id}"
            )));
        }
    };

    let position = Position {
        id,
        person_id: row.get("person_id")?,
        org_id: row.get("org_id")?,
        period: Period::new(row.get::<_, String>("semester")?, row.get("year")?),
        rank: row.get("pos")?,
        is_admin,
    };
    position.validate()?;
    Ok(position)
}

fn ensure_position_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
