//! Ledger store contract.

use super::entry::LedgerEntry;
use super::error::LedgerError;

/// Durable, append-only log of execution attempts, and the single source
/// of truth for "has this unit run".
///
/// Implementations never mutate or delete entries; history is only ever
/// extended. The unique execution index over `(execution_id, id, author)`
/// turns an accidental double-append within one run into a store-level
/// rejection instead of silent duplication. Rollback audit states
/// (`RolledBack`, `RollbackFailed`) are exempt from the index: they
/// legitimately follow a `Failed` entry for the same unit within one
/// execution.
pub trait LedgerStore: Send + Sync {
    /// Prepares storage for use.
    ///
    /// With `create_index = true` the unique execution index is created
    /// when absent. With `create_index = false` the index is only
    /// checked.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::IndexMissing`] when creation is disabled
    /// and the index does not exist, or [`LedgerError::Backend`] on store
    /// faults.
    fn initialize(&self, create_index: bool) -> Result<(), LedgerError>;

    /// Whether the identity's most recent relevant entry marks it as
    /// done.
    ///
    /// True iff the latest relevant entry for `(id, author)` has state
    /// `Executed` or no state at all; false for any other state or when
    /// no entry exists. `Ignored` rows are audit-only and never decide
    /// satisfaction either way.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] on store faults or unreadable
    /// rows.
    fn is_satisfied(&self, id: &str, author: &str) -> Result<bool, LedgerError>;

    /// Appends one entry. Prior entries are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateEntry`] when the unique execution
    /// index rejects the write, or [`LedgerError::Backend`] on store
    /// faults.
    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// Every entry, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] on store faults.
    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Entries for one identity, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] on store faults.
    fn entries_for(&self, id: &str, author: &str) -> Result<Vec<LedgerEntry>, LedgerError>;
}
