//! Combined lock and ledger status.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use convoy_core::ledger::{EntryState, LedgerEntry, LedgerStore};
use convoy_core::lock::LockStore;
use convoy_core::time::{Clock, SystemClock};
use serde_json::json;

use super::util::{format_ms, open_ledger_store, open_lock_store};

/// Shows the lock row for `key` and the newest recorded state for every
/// migration identity in the ledger.
pub fn run(store_path: &Path, key: &str, json: bool) -> Result<()> {
    let lock_store = open_lock_store(store_path)?;
    let ledger = open_ledger_store(store_path)?;

    let now_ms = SystemClock.now_ms();
    let record = lock_store.find_by_key(key)?;
    let entries = ledger.entries()?;
    let latest = latest_per_identity(&entries);

    if json {
        let payload = json!({
            "lock": record.map(|row| json!({
                "key": row.key,
                "owner": row.owner,
                "expires_at_ms": row.expires_at_ms,
                "held": !row.is_expired_at(now_ms),
            })),
            "migrations": latest
                .iter()
                .map(|entry| json!({
                    "id": entry.id,
                    "author": entry.author,
                    "state": entry.state.map(EntryState::as_str),
                    "recorded_at_ms": entry.created_at_ms,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match record {
        None => println!("Lock '{key}': not held (no row)"),
        Some(row) if row.is_expired_at(now_ms) => println!(
            "Lock '{key}': expired (was held by {} until {})",
            row.owner,
            format_ms(row.expires_at_ms)
        ),
        Some(row) => println!(
            "Lock '{key}': held by {} until {}",
            row.owner,
            format_ms(row.expires_at_ms)
        ),
    }

    if latest.is_empty() {
        println!("No migrations recorded");
        return Ok(());
    }

    println!();
    println!(
        "{:<28} {:<16} {:<16} {:<24}",
        "ID", "AUTHOR", "STATE", "RECORDED AT"
    );
    println!("{}", "-".repeat(86));
    for entry in latest {
        println!(
            "{:<28} {:<16} {:<16} {:<24}",
            entry.id,
            entry.author,
            state_label(entry.state),
            format_ms(entry.created_at_ms)
        );
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Newest entry per `(id, author)`, sorted by identity for display.
///
/// `entries` must already be newest first, which is how the ledger store
/// returns them.
fn latest_per_identity(entries: &[LedgerEntry]) -> Vec<&LedgerEntry> {
    let mut seen = HashSet::new();
    let mut latest: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|entry| seen.insert((entry.id.as_str(), entry.author.as_str())))
        .collect();
    latest.sort_by(|a, b| (&a.id, &a.author).cmp(&(&b.id, &b.author)));
    latest
}

fn state_label(state: Option<EntryState>) -> &'static str {
    state.map_or("(none)", EntryState::as_str)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, author: &str, created_at_ms: u64, state: Option<EntryState>) -> LedgerEntry {
        LedgerEntry {
            execution_id: "run-1".to_string(),
            id: id.to_string(),
            author: author.to_string(),
            created_at_ms,
            state,
            set_name: "set".to_string(),
            execution_millis: 0,
            hostname: "host".to_string(),
            error: None,
            metadata: None,
        }
    }

    #[test]
    fn latest_per_identity_keeps_the_first_occurrence() {
        // Newest first, as the store returns them.
        let entries = vec![
            entry("b", "dev", 300, Some(EntryState::Failed)),
            entry("a", "dev", 200, Some(EntryState::Executed)),
            entry("b", "dev", 100, Some(EntryState::Executed)),
        ];

        let latest = latest_per_identity(&entries);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].id, "a");
        assert_eq!(latest[1].id, "b");
        assert_eq!(latest[1].state, Some(EntryState::Failed));
    }

    #[test]
    fn identical_ids_with_different_authors_stay_separate() {
        let entries = vec![
            entry("a", "dev", 200, Some(EntryState::Executed)),
            entry("a", "ops", 100, Some(EntryState::Failed)),
        ];
        assert_eq!(latest_per_identity(&entries).len(), 2);
    }

    #[test]
    fn state_labels_cover_the_legacy_null() {
        assert_eq!(state_label(Some(EntryState::Executed)), "EXECUTED");
        assert_eq!(state_label(None), "(none)");
    }

    #[test]
    fn status_runs_against_an_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("convoy.db");
        run(&path, "default", false).expect("status");
        run(&path, "default", true).expect("status json");
    }
}
