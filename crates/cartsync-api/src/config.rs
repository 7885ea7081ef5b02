use std::collections::HashMap;
use std::env;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub max_upload_bytes: usize,
    pub log_page_size: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("log_page_size", &self.log_page_size)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "CARTSYNC_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, "CARTSYNC_DATABASE_PATH", "cartsync.db");

        let max_upload_bytes = value_or_default(&lookup, "CARTSYNC_MAX_UPLOAD_BYTES", "16777216")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "CARTSYNC_MAX_UPLOAD_BYTES must be an integer in [1024, 67108864]".to_string(),
                )
            })?;
        if !(1_024..=67_108_864).contains(&max_upload_bytes) {
            return Err(ConfigError::Invalid(
                "CARTSYNC_MAX_UPLOAD_BYTES must be in [1024, 67108864]".to_string(),
            ));
        }

        let log_page_size = value_or_default(&lookup, "CARTSYNC_LOG_PAGE_SIZE", "50")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "CARTSYNC_LOG_PAGE_SIZE must be an integer in [1, 500]".to_string(),
                )
            })?;
        if !(1..=500).contains(&log_page_size) {
            return Err(ConfigError::Invalid(
                "CARTSYNC_LOG_PAGE_SIZE must be in [1, 500]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            database_path,
            max_upload_bytes,
            log_page_size,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .unwrap_or_else(|| default.to_string())
}
