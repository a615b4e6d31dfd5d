//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, flags, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Largest accepted scan page.
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_dir` or `policies_file` is empty
    /// - `page_size` is 0 or exceeds `MAX_PAGE_SIZE`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "cache_dir".into(), reason: "must not be empty".into() });
        }

        if self.policies_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "policies_file".into(), reason: "must not be empty".into() });
        }

        if self.page_size == 0 {
            return Err(ConfigError::Invalid { field: "page_size".into(), reason: "must be greater than 0".into() });
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                field: "page_size".into(),
                reason: format!("must not exceed {MAX_PAGE_SIZE}"),
            });
        }

        Ok(())
    }
}
