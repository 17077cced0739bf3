//! Error types for lease lock operations.

use thiserror::Error;

/// Errors surfaced by [`LeaseLockManager`](super::LeaseLockManager).
///
/// Transient store faults never appear here directly: acquire and ensure
/// retry them internally and report [`LockError::Timeout`] once the
/// acquisition deadline is exhausted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LockError {
    /// The total wait budget for the lock was exhausted.
    #[error("gave up acquiring lock '{key}' after {waited_ms}ms{}", holder_suffix(.holder))]
    Timeout {
        /// Lock key that could not be acquired or refreshed.
        key: String,
        /// Milliseconds spent trying before giving up.
        waited_ms: u64,
        /// Owner holding the lock at the last failed attempt, if any.
        holder: Option<String>,
    },

    /// The lease silently expired and another owner took it.
    #[error("lock '{key}' is held by another process: {current_owner}")]
    Stolen {
        /// Lock key whose lease was lost.
        key: String,
        /// Owner currently holding the lock.
        current_owner: String,
    },

    /// The manager was used after release began.
    #[error("lock '{key}' manager is closed: release already started")]
    Closed {
        /// Lock key of the closed manager.
        key: String,
    },

    /// Timing parameters rejected at build time.
    #[error("invalid lock configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with the configuration.
        reason: String,
    },
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(owner) => format!(": held by {owner}"),
        None => String::new(),
    }
}

/// Errors from [`LockStore`](super::LockStore) implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LockStoreError {
    /// A non-expired lease owned by someone else blocks the write.
    #[error("lock already held by {current_owner} until {expires_at_ms}")]
    AlreadyHeld {
        /// Owner of the blocking lease.
        current_owner: String,
        /// Expiry of the blocking lease, epoch milliseconds.
        expires_at_ms: u64,
    },

    /// Conditional update or delete found the row owned elsewhere.
    #[error("lock not owned by caller{}", not_owner_suffix(.current_owner))]
    NotOwner {
        /// Current owner of the row; `None` when no row exists.
        current_owner: Option<String>,
    },

    /// Driver-level fault (connection, I/O, SQL).
    #[error("lock store backend error: {reason}")]
    Backend {
        /// Driver-reported failure description.
        reason: String,
    },
}

fn not_owner_suffix(current_owner: &Option<String>) -> String {
    match current_owner {
        Some(owner) => format!(" (currently owned by {owner})"),
        None => String::from(" (no lock row exists)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_includes_holder() {
        let err = LockError::Timeout {
            key: "default".to_string(),
            waited_ms: 180_000,
            holder: Some("owner-a".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("default"));
        assert!(msg.contains("180000ms"));
        assert!(msg.contains("owner-a"));
    }

    #[test]
    fn timeout_display_without_holder() {
        let err = LockError::Timeout {
            key: "default".to_string(),
            waited_ms: 5,
            holder: None,
        };
        assert!(!err.to_string().contains("held by"));
    }

    #[test]
    fn not_owner_display_covers_missing_row() {
        let err = LockStoreError::NotOwner {
            current_owner: None,
        };
        assert!(err.to_string().contains("no lock row"));
    }
}
