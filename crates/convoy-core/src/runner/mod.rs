//! Single-shot migration execution under the distributed lock.
//!
//! The runner ties the other modules together: it assembles the catalog,
//! prepares the ledger, serializes against concurrent processes through
//! the lease lock, and then walks the catalog recording one outcome per
//! unit. The result is a [`RunReport`] that replaces shared mutable
//! bookkeeping: everything a caller needs to assert on afterwards is in
//! the returned value.
//!
//! # Architecture
//!
//! ```text
//!   RunnerBuilder -> MigrationRunner::run()
//!        |
//!        |  1. MigrationCatalog::build      (catalog)
//!        |  2. LedgerStore::initialize      (ledger)
//!        |  3. LeaseLockManager::acquire    (lock)
//!        v
//!   for each unit:  is_satisfied? -> ensure() -> before/execution
//!        |                                          |
//!        |          append Executed/Failed/Ignored  |
//!        +----------- rollback + audit on failure <-+
//!        |
//!        v
//!   release lease -> RunReport
//! ```
//!
//! # Key Concepts
//!
//! - **Single-shot**: a runner instance executes once; a second
//!   [`MigrationRunner::run`] call answers
//!   [`RunnerError::AlreadyExecuted`].
//! - **Fail-fast vs. continue**: a failing unit with `fail_fast` stops
//!   the run and surfaces [`RunnerError::MigrationFailed`] carrying the
//!   partial report; without it the failure is recorded and the walk
//!   continues.
//! - **Guarded lease**: the lease is acquired before the first unit and
//!   released on every exit path, panics included.
//! - **Events**: optional [`RunEvents`] hooks observe run boundaries
//!   without participating in control flow.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use convoy_core::catalog::{MigrationSet, MigrationUnit};
//! use convoy_core::ledger::SqliteLedgerStore;
//! use convoy_core::lock::SqliteLockStore;
//! use convoy_core::runner::MigrationRunner;
//!
//! let set = MigrationSet::builder("client-initializer")
//!     .order("001")
//!     .unit(
//!         MigrationUnit::builder("create-clients")
//!             .author("platform")
//!             .order("001")
//!             .execution(|_resources| Ok(()))
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let mut runner = MigrationRunner::builder()
//!     .lock_store(Arc::new(SqliteLockStore::in_memory()?))
//!     .ledger_store(Arc::new(SqliteLedgerStore::in_memory()?))
//!     .set(set)
//!     .build()?;
//!
//! let report = runner.run()?;
//! assert!(report.is_success());
//! assert_eq!(report.executed().count(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod driver;
mod error;
mod events;
mod report;


pub use driver::{MigrationRunner, RunnerBuilder};
pub use error::RunnerError;
pub use events::RunEvents;
pub use report::{RollbackOutcome, RunReport, UnitOutcome, UnitReport};
