//! First-run setup and config migration.
//!
//! Writes the embedded default configuration when none exists and stamps the
//! config file with the running version after an upgrade.

pub mod version;

use crate::config;
use version::{SetupAction, CURRENT_VERSION};

/// Embedded default configuration template.
const DEFAULT_CONFIG: &str = include_str!("../../environments/yarec.toml");

/// Checks the config file and installs or migrates it as needed.
///
/// # Errors
/// Returns an error if the config directory or file cannot be read or written.
pub fn ensure_config() -> anyhow::Result<()> {
    let config_path = config::config_path()?;

    match version::check_setup_needed(&config_path)? {
        SetupAction::Install => {
            let content = format!("config_version = \"{CURRENT_VERSION}\"\n{DEFAULT_CONFIG}");
            std::fs::write(&config_path, content)?;
            tracing::info!("Default configuration written to {}", config_path.display());
        }
        SetupAction::Migrate { from } => {
            version::update_config_version(&config_path)?;
            tracing::info!(
                "Configuration migrated from version {} to {}",
                from,
                CURRENT_VERSION
            );
        }
        SetupAction::UpToDate => {
            tracing::debug!("Config version up to date ({})", CURRENT_VERSION);
        }
    }

    Ok(())
}
