//! Ledger history listing.

use std::path::Path;

use anyhow::Result;
use convoy_core::ledger::{EntryState, LedgerEntry, LedgerStore};

use super::util::{format_ms, open_ledger_store};

/// Prints ledger entries, newest first, optionally narrowed to one
/// migration id or author.
pub fn run(store_path: &Path, id: Option<&str>, author: Option<&str>, json: bool) -> Result<()> {
    let ledger = open_ledger_store(store_path)?;
    let entries = apply_filters(ledger.entries()?, id, author);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No ledger entries");
        return Ok(());
    }

    println!(
        "{:<24} {:<28} {:<16} {:<16} {:>8}  {}",
        "RECORDED AT", "ID", "AUTHOR", "STATE", "MILLIS", "EXECUTION"
    );
    println!("{}", "-".repeat(110));
    for entry in &entries {
        println!(
            "{:<24} {:<28} {:<16} {:<16} {:>8}  {}",
            format_ms(entry.created_at_ms),
            entry.id,
            entry.author,
            entry
                .state
                .map_or("(none)", EntryState::as_str),
            entry.execution_millis,
            entry.execution_id
        );
        if let Some(error) = &entry.error {
            println!("    error: {error}");
        }
    }

    Ok(())
}

/// Keeps the entries matching both given filters; a missing filter matches
/// everything.
fn apply_filters(
    entries: Vec<LedgerEntry>,
    id: Option<&str>,
    author: Option<&str>,
) -> Vec<LedgerEntry> {
    entries
        .into_iter()
        .filter(|entry| id.map_or(true, |want| entry.id == want))
        .filter(|entry| author.map_or(true, |want| entry.author == want))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, author: &str) -> LedgerEntry {
        LedgerEntry {
            execution_id: "run-1".to_string(),
            id: id.to_string(),
            author: author.to_string(),
            created_at_ms: 0,
            state: Some(EntryState::Executed),
            set_name: "set".to_string(),
            execution_millis: 0,
            hostname: "host".to_string(),
            error: None,
            metadata: None,
        }
    }

    #[test]
    fn no_filters_keep_everything() {
        let entries = vec![entry("a", "dev"), entry("b", "ops")];
        assert_eq!(apply_filters(entries, None, None).len(), 2);
    }

    #[test]
    fn filters_narrow_by_id_and_author() {
        let entries = vec![entry("a", "dev"), entry("a", "ops"), entry("b", "dev")];

        let by_id = apply_filters(entries.clone(), Some("a"), None);
        assert_eq!(by_id.len(), 2);

        let by_both = apply_filters(entries.clone(), Some("a"), Some("ops"));
        assert_eq!(by_both.len(), 1);
        assert_eq!(by_both[0].author, "ops");

        let by_author = apply_filters(entries, None, Some("dev"));
        assert_eq!(by_author.len(), 2);
    }

    #[test]
    fn history_runs_against_an_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("convoy.db");
        run(&path, None, None, false).expect("history");
        run(&path, Some("a"), None, true).expect("history json");
    }
}
