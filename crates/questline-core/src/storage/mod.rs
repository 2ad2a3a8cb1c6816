mod config;
pub mod database;
pub mod migrations;
pub mod store;

pub use config::{AchievementsConfig, Config, LoggingConfig, OutboxConfig, ProfileConfig};
pub use database::Database;
pub use store::{ProcessedEvent, ProgressRecord, ProgressStore, StoredProgression};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `QUESTLINE_DATA_DIR` wins outright. Otherwise `~/.config/questline/`,
/// or `~/.config/questline-dev/` when `QUESTLINE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("QUESTLINE_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("QUESTLINE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("questline-dev")
            } else {
                base_dir.join("questline")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
