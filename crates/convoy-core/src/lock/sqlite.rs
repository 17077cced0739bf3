//! `SQLite`-backed lock store.
//!
//! Cross-process arbitration rides on `SQLite`'s own locking: every
//! conditional write is a single guarded statement (or one short
//! transaction), so concurrent managers in different processes race on the
//! database, never on in-process state.

// SQLite returns i64 for integer columns, but expiry timestamps are always
// non-negative and fit u64 until far past any realistic deployment.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::error::LockStoreError;
use super::store::{LockRecord, LockStatus, LockStore};
use crate::time::{Clock, SystemClock};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Lock store persisting lease rows in a `SQLite` database.
///
/// The takeover rule of [`LockStore::insert_if_absent`] is expressed as one
/// UPSERT whose update arm only fires when the existing row is expired or
/// already owned by the caller; a blocked write reads the blocking row in
/// the same transaction.
pub struct SqliteLockStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLockStore").finish_non_exhaustive()
    }
}

impl SqliteLockStore {
    /// Opens or creates the lock database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LockStoreError::Backend`] if the database cannot be opened
    /// or the schema applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LockStoreError> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Opens or creates the lock database with an injected clock.
    ///
    /// The clock decides which rows count as expired during takeover; tests
    /// share one simulated clock between store and managers.
    ///
    /// # Errors
    ///
    /// Returns [`LockStoreError::Backend`] if the database cannot be opened
    /// or the schema applied.
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LockStoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(backend)?;
        Self::from_connection(conn, clock)
    }

    /// Creates an in-memory lock store for testing.
    ///
    /// # Errors
    ///
    /// Returns [`LockStoreError::Backend`] if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, LockStoreError> {
        Self::in_memory_with_clock(Arc::new(SystemClock))
    }

    /// Creates an in-memory lock store with an injected clock.
    ///
    /// # Errors
    ///
    /// Returns [`LockStoreError::Backend`] if the schema cannot be applied.
    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, LockStoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, LockStoreError> {
        conn.execute_batch(SCHEMA_SQL).map_err(backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    fn read_record(
        conn: &Connection,
        key: &str,
    ) -> Result<Option<LockRecord>, LockStoreError> {
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT status, owner, expires_at_ms FROM locks WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(backend)?;

        match row {
            None => Ok(None),
            Some((status, owner, expires_at_ms)) => Ok(Some(LockRecord {
                key: key.to_string(),
                status: parse_status(&status)?,
                owner,
                expires_at_ms: expires_at_ms as u64,
            })),
        }
    }
}

impl LockStore for SqliteLockStore {
    fn insert_if_absent(
        &self,
        key: &str,
        owner: &str,
        expires_at_ms: u64,
    ) -> Result<(), LockStoreError> {
        let mut conn = self.conn.lock().expect("lock store mutex poisoned");
        let now_ms = self.clock.now_ms();

        let tx = conn.transaction().map_err(backend)?;
        let changed = tx
            .execute(
                "INSERT INTO locks (key, status, owner, expires_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     status = excluded.status,
                     owner = excluded.owner,
                     expires_at_ms = excluded.expires_at_ms
                 WHERE locks.owner = excluded.owner
                    OR locks.expires_at_ms <= ?5",
                params![key, LockStatus::Held.as_str(), owner, expires_at_ms, now_ms],
            )
            .map_err(backend)?;

        if changed == 0 {
            // The same transaction still sees the row that blocked the
            // upsert.
            let blocking = Self::read_record(&tx, key)?;
            tx.commit().map_err(backend)?;
            return match blocking {
                Some(record) => Err(LockStoreError::AlreadyHeld {
                    current_owner: record.owner,
                    expires_at_ms: record.expires_at_ms,
                }),
                None => Err(LockStoreError::Backend {
                    reason: "lock row vanished during conditional insert".to_string(),
                }),
            };
        }

        tx.commit().map_err(backend)?;
        Ok(())
    }

    fn update_if_owner(
        &self,
        key: &str,
        owner: &str,
        new_expires_at_ms: u64,
    ) -> Result<(), LockStoreError> {
        let mut conn = self.conn.lock().expect("lock store mutex poisoned");

        let tx = conn.transaction().map_err(backend)?;
        let changed = tx
            .execute(
                "UPDATE locks SET expires_at_ms = ?3 WHERE key = ?1 AND owner = ?2",
                params![key, owner, new_expires_at_ms],
            )
            .map_err(backend)?;

        if changed == 0 {
            let current = Self::read_record(&tx, key)?;
            tx.commit().map_err(backend)?;
            return Err(LockStoreError::NotOwner {
                current_owner: current.map(|record| record.owner),
            });
        }

        tx.commit().map_err(backend)?;
        Ok(())
    }

    fn delete_if_owner(&self, key: &str, owner: &str) -> Result<(), LockStoreError> {
        let conn = self.conn.lock().expect("lock store mutex poisoned");
        conn.execute(
            "DELETE FROM locks WHERE key = ?1 AND owner = ?2",
            params![key, owner],
        )
        .map_err(backend)?;
        Ok(())
    }

    fn find_by_key(&self, key: &str) -> Result<Option<LockRecord>, LockStoreError> {
        let conn = self.conn.lock().expect("lock store mutex poisoned");
        Self::read_record(&conn, key)
    }
}

fn parse_status(raw: &str) -> Result<LockStatus, LockStoreError> {
    match raw {
        "HELD" => Ok(LockStatus::Held),
        other => Err(LockStoreError::Backend {
            reason: format!("unknown lock status '{other}'"),
        }),
    }
}

fn backend(err: rusqlite::Error) -> LockStoreError {
    LockStoreError::Backend {
        reason: err.to_string(),
    }
}
