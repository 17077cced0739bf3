//! Lease-based distributed lock.
//!
//! Exactly one process at a time may run migrations against a shared
//! backing store. There is no coordinator: arbitration happens entirely
//! through conditional writes on a lease row, and liveness comes from
//! expiry takeover rather than failure detection. A crashed holder simply
//! stops renewing; the next contender supersedes the row once it expires.
//!
//! # Architecture
//!
//! ```text
//!   LeaseLockManager ----------------+
//!     | acquire / ensure / release   |
//!     v                              v
//!   LockStore (trait)          renewal daemon (thread)
//!     |                              |
//!     v                              | periodic ensure()
//!   SqliteLockStore  <---------------+
//!     |
//!     v
//!   locks table: key -> (status, owner, expires_at_ms)
//! ```
//!
//! # Key Concepts
//!
//! - **Lease**: a row `(key, owner, expires_at_ms)`. Ownership is
//!   exclusive while `now <= expires_at_ms`; an expired row is superseded
//!   in place by the next acquirer, never deleted by a foreign owner.
//! - **Conditional writes**: all mutations are guarded. Insert succeeds
//!   only when the key is free, expired, or self-owned; update and delete
//!   only for the current owner. The store's own transactionality is the
//!   sole cross-process synchronization primitive.
//! - **Renewal**: the holder extends its lease when the remaining
//!   lifetime falls inside a refresh margin, either from a background
//!   daemon or from explicit [`LeaseLockManager::ensure`] calls.
//! - **Single-use**: a manager serves one acquire/release cycle; after
//!   release every operation answers [`LockError::Closed`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use convoy_core::lock::{LeaseLockManager, SqliteLockStore};
//!
//! let store = Arc::new(SqliteLockStore::in_memory()?);
//! let manager = LeaseLockManager::builder(store).owner("runner-1").build()?;
//!
//! manager.acquire()?;
//! assert!(manager.is_held());
//! // ... do guarded work, calling manager.ensure() between long steps ...
//! manager.release();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod manager;
mod sqlite;
mod store;


pub use error::{LockError, LockStoreError};
pub use manager::{
    DEFAULT_ACQUIRED_FOR_MS, DEFAULT_KEY, DEFAULT_TRY_FREQUENCY_MS, LeaseLockManager,
    LockManagerBuilder, MIN_ACQUIRED_FOR_MS, MIN_RETRY_SLEEP_MS, MIN_TRY_FREQUENCY_MS,
};
pub use sqlite::SqliteLockStore;
pub use store::{LockRecord, LockStatus, LockStore};
