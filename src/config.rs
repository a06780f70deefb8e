// Configuration File Support
//
// TOML configuration for the agentgate binary with environment variable
// overrides. Loaded from the XDG config directory by default:
// ~/.config/agentgate/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::permissions::PermissionSet;
use crate::rate_limit::{ApiLimitsConfig, RateLimitConfig};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Generic keyed rate limiter
    pub rate_limit: RateLimitConfig,

    /// Social-API limits
    pub api_limits: ApiLimitsConfig,

    /// Agent identity; its `permissions` table holds the action policy
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub identity: serde_json::Value,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            api_limits: ApiLimitsConfig::default(),
            identity: serde_json::Value::Null,
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default().apply_env_overrides());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        let config = config.apply_env_overrides();

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/agentgate/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "agentgate", "agentgate") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("agentgate")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - AGENTGATE_LOG_LEVEL
    /// - AGENTGATE_LOG_FORMAT
    /// - AGENTGATE_RATE_CAPACITY
    /// - AGENTGATE_RATE_REFILL
    /// - AGENTGATE_MAX_BUCKETS
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("AGENTGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("AGENTGATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.rate_limit = self.rate_limit.with_env_overrides();
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, including any
    /// malformed permission rule.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.rate_limit.validate()?;
        self.api_limits.validate()?;
        self.permissions()?;

        Ok(())
    }

    /// Permission set from `identity.permissions` (empty, deny-all if absent)
    pub fn permissions(&self) -> crate::error::Result<PermissionSet> {
        match self.identity.get("permissions") {
            Some(data) => PermissionSet::from_value(data, false),
            None => Ok(PermissionSet::default()),
        }
    }
}
