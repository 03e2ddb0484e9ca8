//! Run configuration.
//!
//! Loaded from YAML after environment interpolation, then validated.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyBaseUrlSnafu, EmptyIdentifiersPathSnafu, EmptyNamespaceSnafu,
    EmptyStorageUrlSnafu, EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu, ZeroAttemptsSnafu,
};
use crate::fetch::RetryPolicy;
use crate::fetch::jikan::DEFAULT_BASE_URL;
use crate::roi::AttributionRates;

pub use vars::{interpolate, interpolate_with};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    /// Licensing inputs. Without them only the title catalog is produced.
    #[serde(default)]
    pub licensing: Option<LicensingConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

/// External title API and the identifiers to request from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Newline-delimited file of title identifiers.
    pub identifiers_path: PathBuf,

    /// Minimum gap between external calls (default: 550).
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Per-request timeout (default: 10).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_min_interval_ms() -> u64 {
    550
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl SourceConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per title, the first one included (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts (default: 5).
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    crate::fetch::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_secs() -> u64 {
    crate::fetch::retry::DEFAULT_RETRY_DELAY.as_secs()
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy<crate::error::FetchError> {
        RetryPolicy::for_fetch(self.max_attempts, Duration::from_secs(self.delay_secs))
    }
}

/// Where raw and processed data is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `s3://bucket[/prefix]`, `file:///path`, `/path` or `memory://`.
    pub url: String,

    /// Key namespace for this dataset (default: "anime-impact").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Backend options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

fn default_namespace() -> String {
    "anime-impact".to_string()
}

/// Licensing source tables, as keys in the same storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensingConfig {
    pub deals_key: String,
    pub regional_key: String,
    #[serde(default)]
    pub attribution: AttributionRates,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Also write processed tables to this directory.
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

/// Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Disabled by default.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Write an NDJSON failure log under `<namespace>/failures/`.
    #[serde(default)]
    pub failure_log: bool,
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            failure_log: false,
            flush_every: default_flush_every(),
        }
    }
}

fn default_flush_every() -> usize {
    crate::failures::DEFAULT_FLUSH_EVERY
}

impl Config {
    /// Load configuration from a YAML file, interpolating environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let content = vars::interpolate(content).map_err(|errors| {
            EnvInterpolationSnafu {
                message: errors.join("\n"),
            }
            .build()
        })?;
        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.base_url.trim().is_empty(), EmptyBaseUrlSnafu);
        ensure!(
            !self.source.identifiers_path.as_os_str().is_empty(),
            EmptyIdentifiersPathSnafu
        );
        ensure!(self.source.retry.max_attempts >= 1, ZeroAttemptsSnafu);
        ensure!(!self.storage.url.trim().is_empty(), EmptyStorageUrlSnafu);
        ensure!(
            !self.storage.namespace.trim_matches('/').is_empty(),
            EmptyNamespaceSnafu
        );
        if let Some(licensing) = &self.licensing {
            licensing.attribution.validate()?;
        }
        Ok(())
    }

    /// Namespace without surrounding slashes.
    pub fn namespace(&self) -> &str {
        self.storage.namespace.trim_matches('/')
    }
}
