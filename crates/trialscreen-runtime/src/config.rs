//! Screener configuration.
//!
//! Loaded from YAML; every field has a default so an empty file (or no file)
//! is a valid configuration. Durations are humantime strings (`30s`, `1500ms`).
//!
//! ```yaml
//! provider: gemini
//! model: gemini-2.0-flash
//! max_tokens: 2048
//! timeout: 30s
//! inter_call_delay: 1s
//! protocols_dir: trials
//! results_path: screening_results.csv
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::CompletionConfig;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings for screening.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenerConfig {
    /// Provider name in the registry.
    pub provider: String,

    /// Model override. `None` uses the provider's default.
    pub model: Option<String>,

    pub max_tokens: u32,

    /// Per-request HTTP timeout.
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Pause between consecutive model calls in a batch.
    #[serde(with = "humantime_duration")]
    pub inter_call_delay: Duration,

    /// Custom API root for the provider.
    pub base_url: Option<String>,

    /// API key. Falls back to the provider's environment variable.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub protocols_dir: PathBuf,

    pub results_path: PathBuf,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            max_tokens: 2048,
            timeout: Duration::from_secs(30),
            inter_call_delay: Duration::from_secs(1),
            base_url: None,
            api_key: None,
            protocols_dir: PathBuf::from("trials"),
            results_path: PathBuf::from("screening_results.csv"),
        }
    }
}

impl fmt::Debug for ScreenerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenerConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("inter_call_delay", &self.inter_call_delay)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("protocols_dir", &self.protocols_dir)
            .field("results_path", &self.results_path)
            .finish()
    }
}

impl ScreenerConfig {
    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as null, not as a mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ScreenerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::Invalid("provider must not be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be positive".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".to_string()));
        }
        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Completion settings. Temperature is always 0.
    pub fn completion_config(&self, default_model: &str) -> CompletionConfig {
        CompletionConfig {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            timeout: self.timeout,
        }
    }

    /// JSON handed to the provider factory. Only set fields are included.
    pub fn provider_config_json(&self) -> JsonValue {
        let mut config = json!({});
        if let Some(model) = &self.model {
            config["model"] = json!(model);
        }
        if let Some(url) = &self.base_url {
            config["base_url"] = json!(url);
        }
        if let Some(key) = &self.api_key {
            config["api_key"] = json!(key);
        }
        config
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
