//! Migration ledger: the idempotency oracle and audit trail.
//!
//! Every execution attempt appends one [`LedgerEntry`]; nothing is ever
//! mutated or deleted. Whether a unit still needs to run is decided by
//! its most recent entry alone: `Executed` or a legacy entry with no
//! state means done, anything else (including no entry) means run.
//!
//! The store carries a unique index over `(execution_id, id, author)`.
//! Within one execution a double-append is therefore rejected by the
//! store itself; across executions the same identity accumulates history
//! freely. Deployments that forbid index creation get a fail-fast error
//! at initialization instead of silently losing that protection.
//!
//! # Example
//!
//! ```
//! use convoy_core::ledger::{EntryState, LedgerEntry, LedgerStore, SqliteLedgerStore};
//!
//! let store = SqliteLedgerStore::in_memory()?;
//! store.initialize(true)?;
//!
//! store.append(&LedgerEntry {
//!     execution_id: "2024-05-01T12-00-00-abc".to_string(),
//!     id: "create-clients".to_string(),
//!     author: "platform".to_string(),
//!     created_at_ms: 1_714_000_000_000,
//!     state: Some(EntryState::Executed),
//!     set_name: "client-initializer".to_string(),
//!     execution_millis: 12,
//!     hostname: "runner-1".to_string(),
//!     error: None,
//!     metadata: None,
//! })?;
//!
//! assert!(store.is_satisfied("create-clients", "platform")?);
//! # Ok::<(), convoy_core::ledger::LedgerError>(())
//! ```

mod entry;
mod error;
mod sqlite;
mod store;


pub use entry::{EntryState, LedgerEntry};
pub use error::LedgerError;
pub use sqlite::SqliteLedgerStore;
pub use store::LedgerStore;
