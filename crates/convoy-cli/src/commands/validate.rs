//! Configuration validation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use convoy_core::config::ConvoyConfig;

/// Loads and validates the configuration file, then prints the effective
/// settings including every applied default.
pub fn run(config_path: &Path, json: bool) -> Result<()> {
    if !config_path.exists() {
        bail!(
            "configuration file {} does not exist",
            config_path.display()
        );
    }

    let config = ConvoyConfig::load_from_path(config_path)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!(
        "Configuration {} is valid; effective settings:",
        config_path.display()
    );
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(run(&dir.path().join("absent.toml"), false).is_err());
    }

    #[test]
    fn valid_config_passes_in_both_formats() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("convoy.toml");
        std::fs::write(
            &path,
            r#"
[store]
path = "state/convoy.db"

[lock]
key = "deployments"
acquired_for_ms = 30000
"#,
        )
        .expect("write");

        run(&path, false).expect("validate");
        run(&path, true).expect("validate json");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("convoy.toml");
        std::fs::write(
            &path,
            r#"
[lock]
acquired_for_ms = 5
"#,
        )
        .expect("write");

        let err = run(&path, false).expect_err("must reject");
        assert!(format!("{err:#}").contains("acquired_for_ms"));
    }
}
