//! Error types for migration runs.

use thiserror::Error;

use super::report::RunReport;
use crate::catalog::CatalogError;
use crate::ledger::LedgerError;
use crate::lock::LockError;

/// Errors surfaced by [`MigrationRunner::run`](super::MigrationRunner::run).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// The runner was built without a required collaborator.
    #[error("invalid runner configuration: {reason}")]
    InvalidConfig {
        /// What is missing or out of range.
        reason: String,
    },

    /// A runner instance executes at most once.
    #[error("runner already executed; build a new runner for another run")]
    AlreadyExecuted,

    /// Catalog assembly rejected the configured migration sets.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The distributed lock could not be acquired or kept.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// The execution ledger failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A fail-fast migration unit failed and stopped the run.
    #[error("migration '{id}' by '{author}' failed: {error}")]
    MigrationFailed {
        /// Identifier of the failed unit.
        id: String,
        /// Author of the failed unit.
        author: String,
        /// Failure text from the unit's action.
        error: String,
        /// Everything that happened up to and including the failure.
        report: Box<RunReport>,
    },
}
