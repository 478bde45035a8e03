//! Configuration module for the log forwarder.
//!
//! [`ForwarderConfig`] is an immutable set of tunables handed to the forwarder
//! at construction. It can be built in code starting from `Default`, or loaded
//! from `LOG_FORWARDER_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::metadata::LinkingMetadata;
use crate::retry::RetrySettings;

/// Default log ingestion endpoint
pub const DEFAULT_ENDPOINT: &str = "https://log-api.newrelic.com/log/v1";

/// Default maximum number of entries per batch (and buffer capacity)
pub const DEFAULT_MAX_LOGS_PER_BATCH: usize = 10_000;

/// Default maximum number of entries held by in-flight sends
pub const DEFAULT_MAX_QUEUED_LOGS: usize = 100_000;

/// Default depth of the worker's scheduling queue
pub const DEFAULT_MAX_SCHEDULED_LOGS: usize = 1_000;

/// Default flush interval in seconds
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 1;

/// Default shutdown deadline in seconds
pub const DEFAULT_MAX_TERMINATION_SECS: u64 = 10;

/// Default interval between aggregated drop reports in seconds
pub const DEFAULT_DROP_REPORT_INTERVAL_SECS: u64 = 30;

/// Default HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of request-level retries performed by the HTTP transport
pub const DEFAULT_MAX_SEND_RETRIES: u32 = 3;

/// Default number of cause lines kept when rendering an error chain
pub const DEFAULT_MAX_STACK_SIZE: usize = 300;

/// Upper bound for the flush, termination and drop report periods (one year)
pub const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const ENV_ENDPOINT: &str = "LOG_FORWARDER_ENDPOINT";
const ENV_LICENSE_KEY: &str = "LOG_FORWARDER_LICENSE_KEY";
const ENV_MAX_LOGS_PER_BATCH: &str = "LOG_FORWARDER_MAX_LOGS_PER_BATCH";
const ENV_MAX_QUEUED_LOGS: &str = "LOG_FORWARDER_MAX_QUEUED_LOGS";
const ENV_MAX_SCHEDULED_LOGS: &str = "LOG_FORWARDER_MAX_SCHEDULED_LOGS";
const ENV_FLUSH_INTERVAL_SECS: &str = "LOG_FORWARDER_FLUSH_INTERVAL_SECS";
const ENV_MAX_TERMINATION_SECS: &str = "LOG_FORWARDER_MAX_TERMINATION_SECS";
const ENV_REQUEST_TIMEOUT_SECS: &str = "LOG_FORWARDER_REQUEST_TIMEOUT_SECS";
const ENV_MAX_SEND_RETRIES: &str = "LOG_FORWARDER_MAX_SEND_RETRIES";
const ENV_MAX_STACK_SIZE: &str = "LOG_FORWARDER_MAX_STACK_SIZE";

/// Configuration for the log forwarder.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwarderConfig {
    /// URL of the log ingestion endpoint
    pub endpoint: String,

    /// API credential; when unset the linking-metadata provider's key is used
    pub license_key: Option<String>,

    /// Maximum entries per batch; also the capacity of the buffer
    pub max_logs_per_batch: usize,

    /// Maximum entries held by dispatched sends that have not completed
    pub max_queued_logs: usize,

    /// Maximum tasks (appends and pending retries) awaiting the worker
    pub max_scheduled_logs: usize,

    /// Period of the flush timer
    pub flush_interval: Duration,

    /// Deadline for shutdown, covering the final flush and in-flight sends
    pub max_termination_time: Duration,

    /// Period of the aggregated dropped-logs report
    pub drop_report_interval: Duration,

    /// HTTP request timeout used by the HTTP transport
    pub request_timeout: Duration,

    /// Request-level retries performed by the HTTP transport
    pub max_send_retries: u32,

    /// Backoff applied to entries that could not be buffered
    pub retry: RetrySettings,
}

/// Error type for configuration loading failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Configuration error{}: {}",
    .env_var.as_deref().map(|var| format!(" for {}", var)).unwrap_or_default(),
    .message
)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: None,
        }
    }

    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl ForwarderConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to the defaults. The result is validated
    /// with [`ForwarderConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the offending variable if a value is not
    /// a valid number, or if the assembled configuration is invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use log_forwarder::config::ForwarderConfig;
    ///
    /// let config = ForwarderConfig::from_env().expect("Failed to load config");
    /// println!("Endpoint: {}", config.endpoint);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = env::var(ENV_ENDPOINT)
            .map(|v| v.trim().to_string())
            .unwrap_or(defaults.endpoint);

        let license_key = env::var(ENV_LICENSE_KEY)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let config = Self {
            endpoint,
            license_key,
            max_logs_per_batch: parse_var(ENV_MAX_LOGS_PER_BATCH, defaults.max_logs_per_batch)?,
            max_queued_logs: parse_var(ENV_MAX_QUEUED_LOGS, defaults.max_queued_logs)?,
            max_scheduled_logs: parse_var(ENV_MAX_SCHEDULED_LOGS, defaults.max_scheduled_logs)?,
            flush_interval: Duration::from_secs(parse_var(
                ENV_FLUSH_INTERVAL_SECS,
                DEFAULT_FLUSH_INTERVAL_SECS,
            )?),
            max_termination_time: Duration::from_secs(parse_var(
                ENV_MAX_TERMINATION_SECS,
                DEFAULT_MAX_TERMINATION_SECS,
            )?),
            request_timeout: Duration::from_secs(parse_var(
                ENV_REQUEST_TIMEOUT_SECS,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            max_send_retries: parse_var(ENV_MAX_SEND_RETRIES, defaults.max_send_retries)?,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the forwarder cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::new(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;

        if self.max_logs_per_batch == 0 {
            return Err(ConfigError::new("max logs per batch must be greater than 0"));
        }
        if self.max_scheduled_logs == 0 {
            return Err(ConfigError::new("max scheduled logs must be greater than 0"));
        }
        // A flush is held until in-flight sends leave room for a full batch,
        // so a smaller limit would hold it forever.
        if self.max_queued_logs < self.max_logs_per_batch {
            return Err(ConfigError::new(format!(
                "max queued logs ({}) must be at least max logs per batch ({})",
                self.max_queued_logs, self.max_logs_per_batch
            )));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::new("flush interval must be greater than 0"));
        }
        if self.drop_report_interval.is_zero() {
            return Err(ConfigError::new("drop report interval must be greater than 0"));
        }
        for (name, period) in [
            ("flush interval", self.flush_interval),
            ("max termination time", self.max_termination_time),
            ("drop report interval", self.drop_report_interval),
        ] {
            if period > MAX_PERIOD {
                return Err(ConfigError::new(format!(
                    "{} ({:?}) must be at most {:?}",
                    name, period, MAX_PERIOD
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::new("retry max attempts must be greater than 0"));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(ConfigError::new(format!(
                "retry max delay ({:?}) must be >= initial delay ({:?})",
                self.retry.max_delay, self.retry.initial_delay
            )));
        }

        Ok(())
    }

    /// The configured license key, or the ambient one from the metadata
    /// provider when none is configured.
    pub fn resolve_license_key(&self, metadata: &dyn LinkingMetadata) -> Option<String> {
        self.license_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| metadata.license_key())
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            license_key: None,
            max_logs_per_batch: DEFAULT_MAX_LOGS_PER_BATCH,
            max_queued_logs: DEFAULT_MAX_QUEUED_LOGS,
            max_scheduled_logs: DEFAULT_MAX_SCHEDULED_LOGS,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            max_termination_time: Duration::from_secs(DEFAULT_MAX_TERMINATION_SECS),
            drop_report_interval: Duration::from_secs(DEFAULT_DROP_REPORT_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_send_retries: DEFAULT_MAX_SEND_RETRIES,
            retry: RetrySettings::default(),
        }
    }
}

/// Maximum number of cause lines rendered for an entry's error.
///
/// Read from `LOG_FORWARDER_MAX_STACK_SIZE`; unparseable values fall back to
/// the default.
pub fn max_stack_size() -> usize {
    env::var(ENV_MAX_STACK_SIZE)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_STACK_SIZE)
}

fn parse_var<T: FromStr>(env_var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(env_var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))),
        Err(_) => Ok(default),
    }
}
