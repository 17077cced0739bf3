//! Lock recovery.

use std::path::Path;

use anyhow::{Result, bail};
use convoy_core::lock::LockStore;
use convoy_core::time::{Clock, SystemClock};

use super::util::{format_ms, open_lock_store};

/// Removes the lease row for `key`.
///
/// An expired row is removed outright. A live lease is only removed when
/// `--owner` names its current owner; the deletion itself always goes
/// through the owner-scoped conditional delete, so a lease that changes
/// hands mid-command is left alone.
pub fn run(store_path: &Path, key: &str, owner: Option<&str>) -> Result<()> {
    let store = open_lock_store(store_path)?;

    let Some(record) = store.find_by_key(key)? else {
        println!("Lock '{key}': no row to remove");
        return Ok(());
    };

    let expired = record.is_expired_at(SystemClock.now_ms());
    if !expired && owner != Some(record.owner.as_str()) {
        bail!(
            "lock '{key}' is live: held by {} until {}; pass --owner {} to remove it anyway",
            record.owner,
            format_ms(record.expires_at_ms),
            record.owner
        );
    }

    store.delete_if_owner(key, &record.owner)?;
    if expired {
        println!(
            "Removed expired lease for '{key}' (was held by {})",
            record.owner
        );
    } else {
        println!("Removed live lease for '{key}' held by {}", record.owner);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::lock::SqliteLockStore;

    fn store_at(dir: &tempfile::TempDir) -> (std::path::PathBuf, SqliteLockStore) {
        let path = dir.path().join("convoy.db");
        let store = SqliteLockStore::open(&path).expect("open store");
        (path, store)
    }

    #[test]
    fn missing_row_is_a_clean_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, _store) = store_at(&dir);
        run(&path, "default", None).expect("unlock");
    }

    #[test]
    fn expired_rows_are_removed_without_an_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, store) = store_at(&dir);
        let past = SystemClock.now_ms().saturating_sub(5_000);
        store
            .insert_if_absent("default", "crashed-runner", past)
            .expect("insert");

        run(&path, "default", None).expect("unlock");
        assert!(store.find_by_key("default").expect("find").is_none());
    }

    #[test]
    fn live_leases_are_protected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, store) = store_at(&dir);
        let future = SystemClock.now_plus_ms(60_000);
        store
            .insert_if_absent("default", "active-runner", future)
            .expect("insert");

        let err = run(&path, "default", None).expect_err("must refuse");
        assert!(err.to_string().contains("active-runner"));
        assert!(store.find_by_key("default").expect("find").is_some());

        // The wrong owner is refused too.
        run(&path, "default", Some("somebody-else")).expect_err("must refuse");

        run(&path, "default", Some("active-runner")).expect("forced unlock");
        assert!(store.find_by_key("default").expect("find").is_none());
    }
}
