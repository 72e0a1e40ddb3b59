use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_log::LogConfig;

use crate::types::{load_file, non_empty};
use crate::{ConfigError, ConfigErrorKind, SendMode, UpstreamAddress};

/// Connection to the ingestion server.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Upstream {
    /// Base address of the server.
    pub address: UpstreamAddress,
    /// Shared secret for signing request bodies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Delivery strategy.
    pub mode: SendMode,
    /// Maximum number of concurrent requests for per-metric modes.
    pub rate_limit: usize,
    /// Timeout of a single HTTP request in seconds.
    pub timeout: u64,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            address: UpstreamAddress::default(),
            key: None,
            mode: SendMode::default(),
            rate_limit: 10,
            timeout: 5,
        }
    }
}

/// Timing of metric collection and reporting.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Collection {
    /// Seconds between two polls of every collector.
    pub poll_interval: u64,
    /// Seconds between two deliveries to the server.
    pub report_interval: u64,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            poll_interval: 2,
            report_interval: 10,
        }
    }
}

/// The raw agent configuration file.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct AgentConfigValues {
    /// Connection to the ingestion server.
    pub upstream: Upstream,
    /// Timing of collection and reporting.
    pub collection: Collection,
    /// Logging configuration.
    pub logging: LogConfig,
}

/// Overrides for the agent configuration from environment variables or CLI parameters.
#[derive(Debug, Default)]
pub struct AgentOverrides {
    /// The server address.
    pub address: Option<String>,
    /// Report interval in seconds.
    pub report_interval: Option<String>,
    /// Poll interval in seconds.
    pub poll_interval: Option<String>,
    /// Signing secret, an empty value disables signing.
    pub key: Option<String>,
    /// Maximum number of concurrent requests.
    pub rate_limit: Option<String>,
    /// Delivery mode.
    pub mode: Option<String>,
    /// HTTP timeout in seconds.
    pub timeout: Option<String>,
}

/// Configuration of the metrics agent.
#[derive(Clone, Default)]
pub struct AgentConfig {
    values: AgentConfigValues,
    path: Option<PathBuf>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("path", &self.path)
            .field("address", &self.values.upstream.address)
            .field("mode", &self.values.upstream.mode)
            .field("signed", &self.values.upstream.key.is_some())
            .finish()
    }
}

impl AgentConfig {
    /// Loads the configuration from a YAML or JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self {
            values: load_file(path)?,
            path: Some(path.to_path_buf()),
        };

        config.validate().map_err(|e| e.file(path))?;
        Ok(config)
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config = Self {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: None,
        };

        config.validate()?;
        Ok(config)
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(&mut self, overrides: AgentOverrides) -> Result<&mut Self, ConfigError> {
        let upstream = &mut self.values.upstream;

        if let Some(address) = overrides.address {
            upstream.address = address
                .parse()
                .map_err(|err| ConfigError::for_field(err, "address"))?;
        }

        if let Some(key) = overrides.key {
            upstream.key = non_empty(key);
        }

        if let Some(rate_limit) = overrides.rate_limit {
            upstream.rate_limit = rate_limit
                .trim()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "rate_limit"))?;
        }

        if let Some(mode) = overrides.mode {
            upstream.mode = mode
                .trim()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "mode"))?;
        }

        if let Some(timeout) = overrides.timeout {
            upstream.timeout = timeout
                .trim()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "timeout"))?;
        }

        let collection = &mut self.values.collection;

        if let Some(report_interval) = overrides.report_interval {
            collection.report_interval = report_interval
                .trim()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "report_interval"))?;
        }

        if let Some(poll_interval) = overrides.poll_interval {
            collection.poll_interval = poll_interval
                .trim()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "poll_interval"))?;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.values.collection.poll_interval == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("poll_interval"));
        }
        if self.values.collection.report_interval == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("report_interval"));
        }
        if self.values.upstream.timeout == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("timeout"));
        }
        Ok(())
    }

    /// Serializes the effective configuration to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the path of the loaded configuration file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the address of the ingestion server.
    pub fn upstream(&self) -> &UpstreamAddress {
        &self.values.upstream.address
    }

    /// Returns the shared signing secret, if configured.
    pub fn secret_key(&self) -> Option<&[u8]> {
        self.values.upstream.key.as_deref().map(str::as_bytes)
    }

    /// Returns the delivery strategy.
    pub fn send_mode(&self) -> SendMode {
        self.values.upstream.mode
    }

    /// Returns the maximum number of concurrent requests.
    ///
    /// A limit of `0` is treated as `1` by the worker pool.
    pub fn rate_limit(&self) -> usize {
        self.values.upstream.rate_limit
    }

    /// Returns the timeout of a single HTTP request.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.values.upstream.timeout)
    }

    /// Returns the interval between two collector polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.values.collection.poll_interval)
    }

    /// Returns the interval between two deliveries.
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.values.collection.report_interval)
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }
}
