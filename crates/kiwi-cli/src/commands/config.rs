use clap::Subcommand;
use std::collections::BTreeMap;

use kiwi_core::{Config, ConfigError};

use crate::context::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "clock.utc_offset_minutes", "gamification.base_xp")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction, mut config: Config) -> CmdResult {
    match action {
        ConfigAction::Get { key } => {
            let value = config
                .get(&key)
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            print_json(&serde_json::json!({ "key": key, "value": value }))?;
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            let stored = config.get(&key).unwrap_or(value);
            print_json(&serde_json::json!({ "key": key, "value": stored }))?;
        }
        ConfigAction::List => {
            let entries: BTreeMap<String, String> = config.entries().into_iter().collect();
            print_json(&entries)?;
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            print_json(&config)?;
        }
    }
    Ok(())
}
