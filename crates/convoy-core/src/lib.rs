//! Convoy: lease-coordinated, ledger-backed data migration runner.
//!
//! Convoy coordinates exactly-once execution of an ordered set of migration
//! units across cooperating processes that share a single backing store,
//! without a central coordinator.
//!
//! # Architecture
//!
//! ```text
//! MigrationRunner
//!   |-- MigrationCatalog   deterministic order + duplicate/version filtering
//!   |-- LeaseLockManager   cross-process mutual exclusion (lease on LockStore)
//!   |       `-- renewal daemon (background thread, stop/ack channels)
//!   `-- LedgerStore        idempotency oracle + append-only audit log
//! ```
//!
//! # Key Concepts
//!
//! - **Lease**: a time-bounded exclusive ownership row; at most one
//!   non-expired lease exists per key, arbitrated by conditional writes.
//! - **Migration unit**: one idempotent step, identified by `(id, author)`.
//! - **Ledger**: append-only record of execution outcomes; a unit is
//!   satisfied iff its newest relevant entry is `Executed` or carries no
//!   state at all (legacy success marker).
//! - **Fail-fast**: per-unit policy deciding whether a failure aborts the
//!   whole run or lets it continue.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use convoy_core::catalog::{MigrationSet, MigrationUnit};
//! use convoy_core::ledger::SqliteLedgerStore;
//! use convoy_core::lock::SqliteLockStore;
//! use convoy_core::runner::MigrationRunner;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
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
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod ledger;
pub mod lock;
pub mod registry;
pub mod runner;
pub mod time;
