//! Layered configuration: built-in defaults, then a toml file, then
//! environment overrides.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Limits;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
        }
    }
}

/// A partial configuration as read from a file; unset fields keep the
/// values of the layer below.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub logging: LoggingConfigOverride,
    pub limits: LimitsOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        self.logging.apply_to(&mut base.logging);
        self.limits.apply_to(&mut base.limits);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LimitsOverride {
    pub flush_period_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub client_kick_period_ms: Option<u64>,
    pub outbound_buffer: Option<usize>,
    pub submission_buffer: Option<usize>,
    pub history_safety_window: Option<u64>,
    pub max_document_size: Option<usize>,
}

impl LimitsOverride {
    pub fn apply_to(&self, limits: &mut Limits) {
        if let Some(value) = self.flush_period_ms {
            limits.flush_period_ms = value;
        }
        if let Some(value) = self.idle_timeout_ms {
            limits.idle_timeout_ms = value;
        }
        if let Some(value) = self.client_kick_period_ms {
            limits.client_kick_period_ms = value;
        }
        if let Some(value) = self.outbound_buffer {
            limits.outbound_buffer = value;
        }
        if let Some(value) = self.submission_buffer {
            limits.submission_buffer = value;
        }
        if let Some(value) = self.history_safety_window {
            limits.history_safety_window = value;
        }
        if let Some(value) = self.max_document_size {
            limits.max_document_size = Some(value);
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Load configuration, layering `path` (if it exists) and then the
/// environment over the defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    if path.exists() {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let layer: ConfigLayer = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        layer.apply_to(&mut config);
    }
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(value) = env_u64("SCRIBE_FLUSH_PERIOD_MS") {
        config.limits.flush_period_ms = value;
    }
    if let Some(value) = env_u64("SCRIBE_IDLE_TIMEOUT_MS") {
        config.limits.idle_timeout_ms = value;
    }
    if let Ok(filter) = std::env::var("SCRIBE_LOG") {
        config.logging.filter = Some(filter);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
