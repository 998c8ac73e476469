use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tasksync_core::db::StoreOptions;
use tasksync_core::{EmptySyncPolicy, SyncOptions};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
    pub empty_sync_policy: EmptySyncPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TASKSYNC_BIND_ADDR", "0.0.0.0:3000");
        let db_path = PathBuf::from(value_or_default(&lookup, "TASKSYNC_DB_PATH", "data.db"));

        let busy_timeout_ms = value_or_default(&lookup, "TASKSYNC_BUSY_TIMEOUT_MS", "5000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TASKSYNC_BUSY_TIMEOUT_MS must be an integer in [0, 60000]".to_string(),
                )
            })?;
        if busy_timeout_ms > 60_000 {
            return Err(ConfigError::Invalid(
                "TASKSYNC_BUSY_TIMEOUT_MS must be in [0, 60000]".to_string(),
            ));
        }

        let empty_sync_policy = value_or_default(&lookup, "TASKSYNC_EMPTY_SYNC_POLICY", "retain")
            .parse::<EmptySyncPolicy>()
            .map_err(|error| {
                ConfigError::Invalid(format!(
                    "TASKSYNC_EMPTY_SYNC_POLICY must be `retain` or `clear` ({error})"
                ))
            })?;

        Ok(Self {
            bind_addr,
            db_path,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            empty_sync_policy,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default().with_busy_timeout(self.busy_timeout)
    }

    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            empty_sync: self.empty_sync_policy,
        }
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
