//! Configuration
//!
//! TOML-backed settings for the processor core. Every field has a default,
//! so an empty file (or no file) yields a working configuration.

use std::path::Path;

use serde::Deserialize;

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Processor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Accept CONNECT without credentials.
    pub allow_anonymous: bool,
    /// Per-session bound on guids queued while the client is offline;
    /// the oldest entry is dropped on overflow.
    pub max_queued_messages: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: true,
            max_queued_messages: 1000,
        }
    }
}

impl ProcessorConfig {
    /// Load settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
