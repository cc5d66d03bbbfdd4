use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::types::EngineConfig;

/// Upper bound on the validation debounce, in milliseconds.
const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl EngineConfig {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/bindery/config.toml` on Unix/macOS, or the
    /// equivalent via `dirs::config_dir()`. Falls back to the current
    /// directory if no config dir is available.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("bindery").join("config.toml")
    }

    /// Loads configuration from the default config file.
    ///
    /// - If the file doesn't exist, returns `EngineConfig::default()`.
    /// - Otherwise parses it as TOML and validates it.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(EngineConfig::default());
        }
        Self::load_from(&path)
    }

    /// Loads and validates configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - The validation debounce is at most one minute
    /// - The persistence directory, when set, is not empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validation.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "validation.debounce_ms must be at most {}, got {}",
                    MAX_DEBOUNCE_MS, self.validation.debounce_ms
                ),
            });
        }

        if let Some(dir) = &self.persistence.dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "persistence.dir must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
