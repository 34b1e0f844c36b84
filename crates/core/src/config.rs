// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use crate::item::{StrategyKind, WorkerOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_QUEUE_LOCK_EXPIRATION: u64 = 30 * 60;
pub const DEFAULT_RUN_LOCK_EXPIRATION: u64 = 60;
pub const DEFAULT_UNIQUE_PREFIX: &str = "uniquejobs";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Global configuration and per-class worker declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub redis_url: String,
    /// Namespace prepended to every digest
    pub unique_prefix: String,
    /// Fallback lease seconds for enqueue-scope locks
    pub default_queue_lock_expiration: u64,
    /// Fallback lease seconds for execute-scope locks
    pub default_run_lock_expiration: u64,
    /// Strategy used when neither the item nor its class names one
    pub default_lock: StrategyKind,
    /// Lease held by a process while it sweeps stale tokens
    #[serde(with = "humantime_serde")]
    pub stale_sweep_lease: Duration,
    pub workers: HashMap<String, WorkerOptions>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            unique_prefix: DEFAULT_UNIQUE_PREFIX.to_string(),
            default_queue_lock_expiration: DEFAULT_QUEUE_LOCK_EXPIRATION,
            default_run_lock_expiration: DEFAULT_RUN_LOCK_EXPIRATION,
            default_lock: StrategyKind::WhileExecuting,
            stale_sweep_lease: Duration::from_secs(10),
            workers: HashMap::new(),
        }
    }
}

impl Config {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unique_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("unique_prefix must not be empty".into()));
        }
        if self.default_queue_lock_expiration == 0 || self.default_run_lock_expiration == 0 {
            return Err(ConfigError::Invalid(
                "default lock expirations must be at least 1 second".into(),
            ));
        }
        for (class, options) in &self.workers {
            if options.lock_resources == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "workers.{class}.lock_resources must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Options declared for a worker class, or defaults if undeclared
    pub fn worker(&self, class: &str) -> WorkerOptions {
        self.workers.get(class).cloned().unwrap_or_default()
    }

    pub fn with_worker(mut self, class: impl Into<String>, options: WorkerOptions) -> Self {
        self.workers.insert(class.into(), options);
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
