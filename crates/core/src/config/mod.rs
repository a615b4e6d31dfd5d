//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RESET_TTL_*)
//! 2. TOML config file (if RESET_TTL_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Command-line flags are applied on top by the binary.

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// File name of the store inside the cache directory.
pub const STORE_FILE: &str = "data.sqlite";

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the HTTP cache.
    ///
    /// Set via RESET_TTL_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// File containing cache policies.
    ///
    /// Set via RESET_TTL_POLICIES_FILE environment variable.
    #[serde(default = "default_policies_file")]
    pub policies_file: PathBuf,

    /// Number of records fetched per scan page.
    ///
    /// Set via RESET_TTL_PAGE_SIZE environment variable.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".httpcache")
}

fn default_policies_file() -> PathBuf {
    PathBuf::from(".httpcache/policies.txt")
}

fn default_page_size() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { cache_dir: default_cache_dir(), policies_file: default_policies_file(), page_size: default_page_size() }
    }
}

impl AppConfig {
    /// Path of the SQLite store inside `cache_dir`.
    pub fn store_path(&self) -> PathBuf {
        self.cache_dir.join(STORE_FILE)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RESET_TTL_`
    /// 2. TOML file from `RESET_TTL_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed.
    /// Validation is left to the caller so flag overrides can be applied
    /// first.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RESET_TTL_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("RESET_TTL_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        cache_dir: Option<PathBuf>,
        policies_file: Option<PathBuf>,
        page_size: Option<usize>,
    ) -> Self {
        if let Some(dir) = cache_dir {
            self.cache_dir = dir;
        }
        if let Some(file) = policies_file {
            self.policies_file = file;
        }
        if let Some(size) = page_size {
            self.page_size = size;
        }
        self
    }
}
