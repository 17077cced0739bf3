//! Configuration parsing and validation.
//!
//! A [`ConvoyConfig`] is the TOML counterpart of the builder knobs:
//! `[store]` locates the backing database, `[lock]` carries the lease
//! timings, `[run]` the catalog filters and runner flags. Loading
//! validates the same minimums the lock builder enforces, so a bad file
//! fails before anything touches the store.
//!
//! # Example
//!
//! ```
//! use convoy_core::config::ConvoyConfig;
//!
//! let config = ConvoyConfig::from_toml(
//!     r#"
//!     [lock]
//!     acquired_for_ms = 30000
//!
//!     [run]
//!     active_profiles = ["production"]
//!     "#,
//! )?;
//! assert_eq!(config.lock.acquired_for_ms, 30_000);
//! assert_eq!(config.lock.key, "default");
//! # Ok::<(), convoy_core::config::ConfigError>(())
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogOptions, VersionRange};
use crate::lock::{MIN_ACQUIRED_FOR_MS, MIN_TRY_FREQUENCY_MS};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConvoyConfig {
    /// Backing store location.
    #[serde(default)]
    pub store: StoreSection,

    /// Distributed lock timings.
    #[serde(default)]
    pub lock: LockSection,

    /// Runner flags and catalog filters.
    #[serde(default)]
    pub run: RunSection,
}

impl ConvoyConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, and the
    /// same errors as [`from_toml`](Self::from_toml) afterwards.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parses and validates a configuration string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML and
    /// [`ConfigError::Validation`] when a setting is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] when encoding fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Applies the same bounds the lock builder enforces, plus version
    /// syntax checks, so a bad file fails at load time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.acquired_for_ms < MIN_ACQUIRED_FOR_MS {
            return Err(ConfigError::Validation(format!(
                "lock.acquired_for_ms must be at least {MIN_ACQUIRED_FOR_MS} ms, got {}",
                self.lock.acquired_for_ms
            )));
        }
        if self.lock.try_frequency_ms < MIN_TRY_FREQUENCY_MS {
            return Err(ConfigError::Validation(format!(
                "lock.try_frequency_ms must be at least {MIN_TRY_FREQUENCY_MS} ms, got {}",
                self.lock.try_frequency_ms
            )));
        }
        if self.lock.quit_trying_after_ms == Some(0) {
            return Err(ConfigError::Validation(
                "lock.quit_trying_after_ms must be greater than zero".to_string(),
            ));
        }
        // Version bounds must parse; reuse the catalog's own rules.
        self.run.catalog_options()?;
        Ok(())
    }
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Path of the SQLite database holding the lock and the ledger.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// `[lock]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSection {
    /// Lock key the run contends on.
    #[serde(default = "default_lock_key")]
    pub key: String,

    /// Lease lifetime in milliseconds.
    #[serde(default = "default_acquired_for_ms")]
    pub acquired_for_ms: u64,

    /// Total acquisition budget in milliseconds. Defaults to three lease
    /// lifetimes when absent.
    #[serde(default)]
    pub quit_trying_after_ms: Option<u64>,

    /// Pause between acquisition attempts in milliseconds.
    #[serde(default = "default_try_frequency_ms")]
    pub try_frequency_ms: u64,

    /// Whether a background thread renews the lease during long units.
    #[serde(default = "default_renewal_daemon")]
    pub renewal_daemon: bool,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            key: default_lock_key(),
            acquired_for_ms: default_acquired_for_ms(),
            quit_trying_after_ms: None,
            try_frequency_ms: default_try_frequency_ms(),
            renewal_daemon: default_renewal_daemon(),
        }
    }
}

/// `[run]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSection {
    /// Whether the run may create the ledger's unique execution index.
    #[serde(default = "default_index_creation")]
    pub index_creation: bool,

    /// Whether skipped units are recorded as `Ignored` entries.
    #[serde(default)]
    pub track_ignored: bool,

    /// Profiles considered active for catalog filtering.
    #[serde(default)]
    pub active_profiles: Vec<String>,

    /// Inclusive lower bound on unit system versions.
    #[serde(default)]
    pub start_version: Option<String>,

    /// Inclusive upper bound on unit system versions.
    #[serde(default)]
    pub end_version: Option<String>,

    /// Author assigned to units that declare none.
    #[serde(default)]
    pub default_author: Option<String>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            index_creation: default_index_creation(),
            track_ignored: false,
            active_profiles: Vec::new(),
            start_version: None,
            end_version: None,
            default_author: None,
        }
    }
}

impl RunSection {
    /// Builds the catalog options this section describes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when a version bound does not
    /// parse.
    pub fn catalog_options(&self) -> Result<CatalogOptions, ConfigError> {
        let version_range =
            VersionRange::parse(self.start_version.as_deref(), self.end_version.as_deref())
                .map_err(|err| ConfigError::Validation(err.to_string()))?;
        Ok(CatalogOptions {
            version_range,
            active_profiles: self.active_profiles.clone(),
            default_author: self.default_author.clone(),
        })
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("convoy.db")
}

fn default_lock_key() -> String {
    crate::lock::DEFAULT_KEY.to_string()
}

const fn default_acquired_for_ms() -> u64 {
    crate::lock::DEFAULT_ACQUIRED_FOR_MS
}

const fn default_try_frequency_ms() -> u64 {
    crate::lock::DEFAULT_TRY_FREQUENCY_MS
}

const fn default_renewal_daemon() -> bool {
    true
}

const fn default_index_creation() -> bool {
    true
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A setting is out of range or inconsistent.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Version;

    #[test]
    fn empty_input_yields_defaults() {
        let config = ConvoyConfig::from_toml("").expect("parse");
        assert_eq!(config.store.path, PathBuf::from("convoy.db"));
        assert_eq!(config.lock.key, "default");
        assert_eq!(config.lock.acquired_for_ms, 60_000);
        assert_eq!(config.lock.quit_trying_after_ms, None);
        assert_eq!(config.lock.try_frequency_ms, 1_000);
        assert!(config.lock.renewal_daemon);
        assert!(config.run.index_creation);
        assert!(!config.run.track_ignored);
        assert!(config.run.active_profiles.is_empty());
    }

    #[test]
    fn full_config_round_trips() {
        let config = ConvoyConfig::from_toml(
            r#"
            [store]
            path = "/var/lib/convoy/convoy.db"

            [lock]
            key = "orders"
            acquired_for_ms = 30000
            quit_trying_after_ms = 90000
            try_frequency_ms = 500
            renewal_daemon = false

            [run]
            index_creation = false
            track_ignored = true
            active_profiles = ["production", "!experimental"]
            start_version = "1.0"
            end_version = "3.0"
            default_author = "platform-team"
            "#,
        )
        .expect("parse");

        assert_eq!(config.store.path, PathBuf::from("/var/lib/convoy/convoy.db"));
        assert_eq!(config.lock.key, "orders");
        assert_eq!(config.lock.acquired_for_ms, 30_000);
        assert_eq!(config.lock.quit_trying_after_ms, Some(90_000));
        assert_eq!(config.lock.try_frequency_ms, 500);
        assert!(!config.lock.renewal_daemon);
        assert!(!config.run.index_creation);
        assert!(config.run.track_ignored);
        assert_eq!(
            config.run.active_profiles,
            vec!["production".to_string(), "!experimental".to_string()]
        );
        assert_eq!(config.run.default_author.as_deref(), Some("platform-team"));

        let rendered = config.to_toml().expect("serialize");
        let reparsed = ConvoyConfig::from_toml(&rendered).expect("reparse");
        assert_eq!(reparsed, config);
    }

    #[test]
    fn validation_rejects_a_short_lease() {
        let err = ConvoyConfig::from_toml(
            r#"
            [lock]
            acquired_for_ms = 1000
            "#,
        )
        .expect_err("should reject");
        match err {
            ConfigError::Validation(message) => {
                assert!(message.contains("acquired_for_ms"));
            },
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_a_tight_retry_pause() {
        let err = ConvoyConfig::from_toml(
            r#"
            [lock]
            try_frequency_ms = 100
            "#,
        )
        .expect_err("should reject");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn validation_rejects_a_zero_acquisition_budget() {
        let err = ConvoyConfig::from_toml(
            r#"
            [lock]
            quit_trying_after_ms = 0
            "#,
        )
        .expect_err("should reject");
        match err {
            ConfigError::Validation(message) => {
                assert!(message.contains("quit_trying_after_ms"));
            },
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_a_malformed_version_bound() {
        let err = ConvoyConfig::from_toml(
            r#"
            [run]
            start_version = "one.two"
            "#,
        )
        .expect_err("should reject");
        match err {
            ConfigError::Validation(message) => {
                assert!(message.contains("version"));
            },
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn catalog_options_carry_the_version_window() {
        let config = ConvoyConfig::from_toml(
            r#"
            [run]
            start_version = "1.0"
            end_version = "3.0"
            "#,
        )
        .expect("parse");
        let options = config.run.catalog_options().expect("options");
        let probe = Version::parse("2.1").expect("version");
        assert!(options.version_range.contains(&probe));
    }

    #[test]
    fn load_from_path_reads_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("convoy.toml");
        std::fs::write(&path, "[lock]\nkey = \"from-disk\"\n").expect("write");

        let config = ConvoyConfig::load_from_path(&path).expect("load");
        assert_eq!(config.lock.key, "from-disk");

        let missing = ConvoyConfig::load_from_path(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
