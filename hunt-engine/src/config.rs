//! Hunt configuration loaded from JSON with per-field defaults.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_CODE_PREFIXES, DEFAULT_HINTS_COLLECTION, DEFAULT_MAX_COMMIT_RETRIES,
    DEFAULT_STORE_TIMEOUT_MS, DEFAULT_TOTAL_LEVELS, DEFAULT_USERS_COLLECTION, MAX_TOTAL_LEVELS,
};

/// Errors raised when hunt configuration invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("total_levels must be between 1 and {max} (got {value})")]
    LevelCount { value: u32, max: u32 },
    #[error("collection name for {field} must not be empty")]
    EmptyCollection { field: &'static str },
    #[error("at least one non-empty code prefix is required")]
    NoCodePrefixes,
    #[error("store_timeout_ms must be greater than zero")]
    ZeroTimeout,
    #[error("invalid code pattern: {0}")]
    Pattern(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("store decodes {store} levels but the hunt is configured for {config}")]
    StoreLevelMismatch { config: u32, store: u32 },
}

/// Names of the durable-store collections the engine addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collections {
    #[serde(default = "Collections::default_users")]
    pub users: String,
    #[serde(default = "Collections::default_hints")]
    pub hints: String,
}

impl Collections {
    fn default_users() -> String {
        DEFAULT_USERS_COLLECTION.to_string()
    }

    fn default_hints() -> String {
        DEFAULT_HINTS_COLLECTION.to_string()
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            users: Self::default_users(),
            hints: Self::default_hints(),
        }
    }
}

/// Top-level configuration for a hunt deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntConfig {
    #[serde(default = "HuntConfig::default_total_levels")]
    pub total_levels: u32,
    #[serde(default)]
    pub collections: Collections,
    /// Prefixes recognised in front of the level number on printed codes.
    #[serde(default = "HuntConfig::default_code_prefixes")]
    pub code_prefixes: Vec<String>,
    #[serde(default = "HuntConfig::default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Compare-and-swap attempts before an advancement gives up.
    #[serde(default = "HuntConfig::default_max_commit_retries")]
    pub max_commit_retries: u32,
}

impl HuntConfig {
    const fn default_total_levels() -> u32 {
        DEFAULT_TOTAL_LEVELS
    }

    fn default_code_prefixes() -> Vec<String> {
        DEFAULT_CODE_PREFIXES
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    const fn default_store_timeout_ms() -> u64 {
        DEFAULT_STORE_TIMEOUT_MS
    }

    const fn default_max_commit_retries() -> u32 {
        DEFAULT_MAX_COMMIT_RETRIES
    }

    /// Build a default configuration for a hunt with `total_levels` stages.
    #[must_use]
    pub fn with_levels(total_levels: u32) -> Self {
        Self {
            total_levels,
            ..Self::default()
        }
    }

    /// Parse and validate configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or violates an invariant.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_levels == 0 || self.total_levels > MAX_TOTAL_LEVELS {
            return Err(ConfigError::LevelCount {
                value: self.total_levels,
                max: MAX_TOTAL_LEVELS,
            });
        }
        if self.collections.users.trim().is_empty() {
            return Err(ConfigError::EmptyCollection { field: "users" });
        }
        if self.collections.hints.trim().is_empty() {
            return Err(ConfigError::EmptyCollection { field: "hints" });
        }
        if !self.code_prefixes.iter().any(|p| !p.trim().is_empty()) {
            return Err(ConfigError::NoCodePrefixes);
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Check that a store decodes records with this hunt's level count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StoreLevelMismatch`] if the counts differ.
    pub const fn check_store_levels(&self, store_levels: u32) -> Result<(), ConfigError> {
        if store_levels == self.total_levels {
            Ok(())
        } else {
            Err(ConfigError::StoreLevelMismatch {
                config: self.total_levels,
                store: store_levels,
            })
        }
    }

    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            total_levels: Self::default_total_levels(),
            collections: Collections::default(),
            code_prefixes: Self::default_code_prefixes(),
            store_timeout_ms: Self::default_store_timeout_ms(),
            max_commit_retries: Self::default_max_commit_retries(),
        }
    }
}
