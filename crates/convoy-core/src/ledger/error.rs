//! Ledger store errors.

use thiserror::Error;

/// Errors raised by a [`LedgerStore`](super::LedgerStore) implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The unique execution index is absent and index creation is
    /// disabled. Proceeding would silently allow duplicate concurrent
    /// inserts, so initialization refuses instead.
    #[error("unique execution index is missing and index creation is disabled")]
    IndexMissing,

    /// An entry with the same execution, id, and author was already
    /// appended.
    #[error("entry for '{id}' by '{author}' already recorded in execution '{execution_id}'")]
    DuplicateEntry {
        /// Execution the duplicate belongs to.
        execution_id: String,
        /// Unit id half of the identity.
        id: String,
        /// Author half of the identity.
        author: String,
    },

    /// The backing store failed or returned something unreadable.
    #[error("ledger store error: {reason}")]
    Backend {
        /// Backend failure detail.
        reason: String,
    },
}
