mod config;
pub mod migrations;
mod store;
mod task_db;

pub use config::{ClockConfig, Config, LoggingConfig, SchedulerConfig};
pub use store::{CompletionCommit, TaskStore};
pub use task_db::TaskDb;

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns the data directory, creating it if needed.
///
/// `KIWI_DATA_DIR` wins when set. Otherwise `~/.config/kiwi[-dev]/`,
/// depending on whether `KIWI_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("KIWI_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("KIWI_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("kiwi-dev")
            } else {
                base_dir.join("kiwi")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
