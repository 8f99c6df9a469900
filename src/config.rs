//! CLI configuration.
//!
//! Loaded from an optional YAML file; a missing file yields defaults so the
//! binary works out of the box against a local Ollama.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};

// -----------------------------------------------------------------------------
// Config (root)
// -----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        serde_yaml::from_str(&contents).map_err(ConfigError::Yaml)
    }
}

// -----------------------------------------------------------------------------
// LlmConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

// -----------------------------------------------------------------------------
// ConfigError
// -----------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
