//! Configuration for the telemetry collector.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ras_client::RasClientConfig;
use ras_logging::LogConfig;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tuning of the poll loop and of subscriber queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Time between two poll ticks, in seconds.
    #[serde(default = "default_poll_interval", with = "secs_f64")]
    pub poll_interval: Duration,

    /// Upper bound for a single remote call, in seconds.
    #[serde(default = "default_rpc_timeout", with = "secs_f64")]
    pub rpc_timeout: Duration,

    /// Number of batches a subscriber may fall behind before it starts
    /// missing batches.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_stream_buffer() -> usize {
    16
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            rpc_timeout: default_rpc_timeout(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("collector.poll_interval must be positive".into()));
        }
        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::Invalid("collector.rpc_timeout must be positive".into()));
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError::Invalid("collector.stream_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub ras: RasClientConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl TelemetryConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ras.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("ras.endpoint must not be empty".into()));
        }
        self.collector.validate()
    }
}

mod secs_f64 {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
