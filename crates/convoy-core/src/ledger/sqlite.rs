//! `SQLite`-backed ledger store.

// SQLite returns i64 for integer columns, but timestamps and durations are
// always non-negative in practice.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};

use super::entry::{EntryState, LedgerEntry};
use super::error::LedgerError;
use super::store::LedgerStore;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Name of the unique index enforcing one entry per execution and
/// identity.
const UNIQUE_EXECUTION_INDEX: &str = "ux_ledger_execution";

const SELECT_COLUMNS: &str = "execution_id, migration_id, author, created_at_ms, state, \
                              set_name, execution_millis, hostname, error, metadata";

/// Ledger store persisting entries in a `SQLite` database.
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedgerStore").finish_non_exhaustive()
    }
}

impl SqliteLedgerStore {
    /// Opens or creates the ledger database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] if the database cannot be opened
    /// or the schema applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(backend)?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory ledger store for testing.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA_SQL).map_err(backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn index_exists(conn: &Connection) -> Result<bool, LedgerError> {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name = ?1",
                params![UNIQUE_EXECUTION_INDEX],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        Ok(found.is_some())
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn initialize(&self, create_index: bool) -> Result<(), LedgerError> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        if create_index {
            // Partial index: one outcome row per unit per execution. The
            // rollback audit states stay out of the key so a FAILED entry
            // can be followed by its ROLLED_BACK record in the same run.
            conn.execute(
                &format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {UNIQUE_EXECUTION_INDEX} \
                     ON ledger_entries (execution_id, migration_id, author) \
                     WHERE state IS NULL \
                        OR state NOT IN ('ROLLED_BACK', 'ROLLBACK_FAILED')"
                ),
                [],
            )
            .map_err(backend)?;
            return Ok(());
        }
        if Self::index_exists(&conn)? {
            Ok(())
        } else {
            Err(LedgerError::IndexMissing)
        }
    }

    fn is_satisfied(&self, id: &str, author: &str) -> Result<bool, LedgerError> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        // IGNORED rows are audit-only markers; satisfaction reads the
        // newest entry among the states that record an actual attempt.
        let state: Option<Option<String>> = conn
            .query_row(
                "SELECT state FROM ledger_entries
                 WHERE migration_id = ?1 AND author = ?2
                   AND (state IS NULL OR state != 'IGNORED')
                 ORDER BY created_at_ms DESC, entry_id DESC
                 LIMIT 1",
                params![id, author],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;

        match state {
            // No entry at all: the unit must run.
            None => Ok(false),
            // Legacy success marker: a row exists but carries no state.
            Some(None) => Ok(true),
            Some(Some(raw)) => parse_state(&raw).map(EntryState::satisfies),
        }
    }

    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| LedgerError::Backend {
                reason: format!("metadata serialization failed: {err}"),
            })?;

        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        conn.execute(
            "INSERT INTO ledger_entries (execution_id, migration_id, author, created_at_ms, \
             state, set_name, execution_millis, hostname, error, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.execution_id,
                entry.id,
                entry.author,
                entry.created_at_ms,
                entry.state.map(EntryState::as_str),
                entry.set_name,
                entry.execution_millis,
                entry.hostname,
                entry.error,
                metadata
            ],
        )
        .map_err(|err| match err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                LedgerError::DuplicateEntry {
                    execution_id: entry.execution_id.clone(),
                    id: entry.id.clone(),
                    author: entry.author.clone(),
                }
            },
            other => backend(other),
        })?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM ledger_entries \
                 ORDER BY created_at_ms DESC, entry_id DESC"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map([], read_entry)
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        rows.into_iter().map(finish_entry).collect()
    }

    fn entries_for(&self, id: &str, author: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM ledger_entries \
                 WHERE migration_id = ?1 AND author = ?2 \
                 ORDER BY created_at_ms DESC, entry_id DESC"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![id, author], read_entry)
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        rows.into_iter().map(finish_entry).collect()
    }
}

/// Raw row image before state and metadata are decoded.
struct RawEntry {
    execution_id: String,
    id: String,
    author: String,
    created_at_ms: i64,
    state: Option<String>,
    set_name: String,
    execution_millis: i64,
    hostname: String,
    error: Option<String>,
    metadata: Option<String>,
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        execution_id: row.get(0)?,
        id: row.get(1)?,
        author: row.get(2)?,
        created_at_ms: row.get(3)?,
        state: row.get(4)?,
        set_name: row.get(5)?,
        execution_millis: row.get(6)?,
        hostname: row.get(7)?,
        error: row.get(8)?,
        metadata: row.get(9)?,
    })
}

fn finish_entry(raw: RawEntry) -> Result<LedgerEntry, LedgerError> {
    let state = raw.state.as_deref().map(parse_state).transpose()?;
    let metadata = raw
        .metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|err| LedgerError::Backend {
            reason: format!("metadata deserialization failed: {err}"),
        })?;
    Ok(LedgerEntry {
        execution_id: raw.execution_id,
        id: raw.id,
        author: raw.author,
        created_at_ms: raw.created_at_ms as u64,
        state,
        set_name: raw.set_name,
        execution_millis: raw.execution_millis as u64,
        hostname: raw.hostname,
        error: raw.error,
        metadata,
    })
}

fn parse_state(raw: &str) -> Result<EntryState, LedgerError> {
    EntryState::parse(raw).ok_or_else(|| LedgerError::Backend {
        reason: format!("unknown entry state '{raw}'"),
    })
}

fn backend(err: rusqlite::Error) -> LedgerError {
    LedgerError::Backend {
        reason: err.to_string(),
    }
}
