//! Client configuration loader.

use nova_act_core::Backend;
use nova_act_dispatch::ExtensionTimings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_key`.
pub const API_KEY_ENV: &str = "NOVA_ACT_API_KEY";

pub const DEFAULT_ENDPOINT_NAME: &str = "alpha-sunshine";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Config file is empty")]
    Empty,

    #[error("Invalid YAML: {0}")]
    InvalidYaml(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` level or filter directive, e.g. `info` or `nova_act::trace=off,debug`.
    pub level: String,
    /// Suppress the progress dots.
    pub quiet: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            quiet: false,
        }
    }
}

/// Extension channel timings, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub poll_interval_s: f64,
    pub ack_timeout_s: f64,
    pub retry_delay_s: f64,
    pub retry_tries: u32,
    pub settle_timeout_s: f64,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: 0.1,
            ack_timeout_s: 30.0,
            retry_delay_s: 2.0,
            retry_tries: 5,
            settle_timeout_s: 15.0,
        }
    }
}

impl ExtensionConfig {
    pub fn timings(&self) -> Result<ExtensionTimings, ConfigError> {
        if self.retry_tries == 0 {
            return Err(ConfigError::Invalid(
                "extension.retry_tries must be at least 1".to_string(),
            ));
        }
        Ok(ExtensionTimings {
            poll_interval: seconds("extension.poll_interval_s", self.poll_interval_s)?,
            ack_timeout: seconds("extension.ack_timeout_s", self.ack_timeout_s)?,
            retry_delay: seconds("extension.retry_delay_s", self.retry_delay_s)?,
            retry_tries: self.retry_tries,
            settle_timeout: seconds("extension.settle_timeout_s", self.settle_timeout_s)?,
        })
    }
}

/// Custom actuation timings, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomConfig {
    /// Upper bound for the settle wait before each step.
    pub settle_timeout_s: f64,
    pub connect_timeout_s: f64,
    pub read_timeout_s: f64,
}

impl Default for CustomConfig {
    fn default() -> Self {
        Self {
            settle_timeout_s: 180.0,
            connect_timeout_s: 30.0,
            read_timeout_s: 300.0,
        }
    }
}

impl CustomConfig {
    pub fn settle_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("custom.settle_timeout_s", self.settle_timeout_s)
    }

    pub fn connect_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("custom.connect_timeout_s", self.connect_timeout_s)
    }

    pub fn read_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("custom.read_timeout_s", self.read_timeout_s)
    }
}

/// Whole-act retry on short-window rate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitRetryConfig {
    /// Total attempts, including the first.
    pub tries: u32,
    pub delay_s: f64,
}

impl Default for RateLimitRetryConfig {
    fn default() -> Self {
        Self {
            tries: 2,
            delay_s: 5.0,
        }
    }
}

impl RateLimitRetryConfig {
    pub fn delay(&self) -> Result<Duration, ConfigError> {
        seconds("rate_limit_retry.delay_s", self.delay_s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub backend: Backend,
    pub endpoint_name: String,
    /// Whether the session runs attached to a terminal.
    pub tty: bool,
    /// Retry the prompt dispatch when the extension does not acknowledge it.
    pub retry: bool,
    pub logging: LoggingConfig,
    pub extension: ExtensionConfig,
    pub custom: CustomConfig,
    pub rate_limit_retry: RateLimitRetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            backend: Backend::default(),
            endpoint_name: DEFAULT_ENDPOINT_NAME.to_string(),
            tty: true,
            retry: true,
            logging: LoggingConfig::default(),
            extension: ExtensionConfig::default(),
            custom: CustomConfig::default(),
            rate_limit_retry: RateLimitRetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Override file values from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override file values from `lookup`. Empty values are ignored.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(api_key) = lookup(API_KEY_ENV).filter(|key| !key.trim().is_empty()) {
            self.api_key = Some(api_key.trim().to_string());
        }
        self
    }

    /// The API key, or a config error naming both places it can come from.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Config missing required field: api_key (or set {})",
                    API_KEY_ENV
                ))
            })
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::Invalid(format!("{field} must be a non-negative number of seconds")))
}

/// Load client configuration from a YAML file.
///
/// Missing sections and fields fall back to their defaults.
///
/// # Errors
/// Returns error if the file is missing, empty, or not valid YAML.
pub fn load_client_config(config_path: impl AsRef<Path>) -> Result<ClientConfig, ConfigError> {
    let config_file = config_path.as_ref();

    if !config_file.exists() {
        return Err(ConfigError::NotFound(config_file.display().to_string()));
    }

    let content = std::fs::read_to_string(config_file)?;

    if content.trim().is_empty() {
        return Err(ConfigError::Empty);
    }

    let config: ClientConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidYaml(e.to_string()))?;

    if config.endpoint_name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "endpoint_name cannot be empty".to_string(),
        ));
    }

    Ok(config)
}
