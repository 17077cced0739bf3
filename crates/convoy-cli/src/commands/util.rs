//! Helpers shared across subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use convoy_core::config::ConvoyConfig;
use convoy_core::ledger::SqliteLedgerStore;
use convoy_core::lock::SqliteLockStore;

/// Loads the configuration, tolerating a missing file.
///
/// A missing file means defaults; a file that exists but fails to parse
/// or validate is an error.
pub fn load_config(path: &Path) -> Result<ConvoyConfig> {
    if !path.exists() {
        return Ok(ConvoyConfig::default());
    }
    ConvoyConfig::load_from_path(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Opens the lock table in the shared store database.
pub fn open_lock_store(path: &Path) -> Result<SqliteLockStore> {
    SqliteLockStore::open(path)
        .with_context(|| format!("failed to open lock store at {}", path.display()))
}

/// Opens the ledger table in the shared store database.
pub fn open_ledger_store(path: &Path) -> Result<SqliteLedgerStore> {
    SqliteLedgerStore::open(path)
        .with_context(|| format!("failed to open ledger store at {}", path.display()))
}

/// Epoch milliseconds as an RFC 3339 timestamp, or the raw number when out
/// of range.
pub fn format_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || ms.to_string(),
            |at| at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ms_renders_rfc3339() {
        assert_eq!(format_ms(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_ms(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn format_ms_falls_back_to_raw_on_overflow() {
        assert_eq!(format_ms(u64::MAX), u64::MAX.to_string());
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(config, ConvoyConfig::default());
    }

    #[test]
    fn broken_config_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("convoy.toml");
        std::fs::write(&path, "this is not toml {{{{").expect("write");
        assert!(load_config(&path).is_err());
    }
}
