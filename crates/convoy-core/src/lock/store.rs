//! Durable lock row contract.
//!
//! The store is the arbiter of races: every write is conditional, so two
//! processes disagreeing about ownership are settled by whichever
//! conditional write the store accepts. Implementations must make each
//! operation atomic with respect to concurrent callers in other processes.

use super::error::LockStoreError;

/// Status of a persisted lease row.
///
/// A row only ever exists in the held state; release deletes it and expiry
/// leaves it in place to be superseded by the next conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The lease is owned until its expiry.
    Held,
}

impl LockStatus {
    /// Stable string form used in persisted rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Held => "HELD",
        }
    }
}

/// One persisted lease row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Lock key; one lease may exist per key.
    pub key: String,
    /// Row status.
    pub status: LockStatus,
    /// Opaque owner id, unique per manager instance.
    pub owner: String,
    /// Expiry, epoch milliseconds. Ownership is exclusive only while
    /// `now < expires_at_ms`.
    pub expires_at_ms: u64,
}

impl LockRecord {
    /// Whether `owner` owns this row.
    #[must_use]
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    /// Whether the row is expired at `now_ms`.
    #[must_use]
    pub const fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Conditional-write contract for the shared lock row.
///
/// `insert_if_absent` doubles as takeover: it succeeds when no row exists,
/// when the existing row is expired, or when the caller already owns it
/// (re-acquiring in place). Only a live lease owned by someone else blocks
/// it.
pub trait LockStore: Send + Sync {
    /// Insert a fresh lease, superseding an expired or self-owned row.
    ///
    /// # Errors
    ///
    /// [`LockStoreError::AlreadyHeld`] with the blocking row when a
    /// non-expired lease owned by another caller exists;
    /// [`LockStoreError::Backend`] on driver faults.
    fn insert_if_absent(
        &self,
        key: &str,
        owner: &str,
        expires_at_ms: u64,
    ) -> Result<(), LockStoreError>;

    /// Extend the lease iff `owner` still owns the row.
    ///
    /// # Errors
    ///
    /// [`LockStoreError::NotOwner`] when the row is missing or owned by
    /// someone else; [`LockStoreError::Backend`] on driver faults.
    fn update_if_owner(
        &self,
        key: &str,
        owner: &str,
        new_expires_at_ms: u64,
    ) -> Result<(), LockStoreError>;

    /// Delete the row iff `owner` owns it; a silent no-op otherwise.
    ///
    /// # Errors
    ///
    /// [`LockStoreError::Backend`] on driver faults.
    fn delete_if_owner(&self, key: &str, owner: &str) -> Result<(), LockStoreError>;

    /// Read the current row for `key`, if any.
    ///
    /// # Errors
    ///
    /// [`LockStoreError::Backend`] on driver faults.
    fn find_by_key(&self, key: &str) -> Result<Option<LockRecord>, LockStoreError>;
}
