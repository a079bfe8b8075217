//! Tracker configuration
//!
//! Loaded from a YAML file; every field has a default so an empty file is a
//! valid configuration:
//!
//! ```yaml
//! server_url: "http://localhost:3000"
//! transport: pull
//! poll_interval: 2s
//!
//! backoff:
//!   base: 2s
//!   multiplier: 1.5
//!   max_failures: 5
//!
//! staleness:
//!   initial_timeout: 150s
//!   resumed_timeout: 60s
//!   steady_timeout: 30s
//!   check_interval: 5s
//!
//! completion:
//!   navigate_to: results
//!   navigate_delay: 1500ms
//!   reset_delay: 3s
//!   invalidate: [executions, results]
//!
//! store:
//!   type: file
//!   path: .execution-tracker/state.json
//!
//! steps:
//!   - name: collect
//!     label: Collecting sources
//!   - name: analyze
//!     label: Analyzing
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tracker::StepCatalog;

pub mod duration;

pub use duration::{format_duration, parse_duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which transport strategy delivers progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Server-initiated websocket subscription
    Push,
    /// Periodic fetch
    #[default]
    Pull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base", with = "duration::human")]
    pub base: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(2)
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_failures() -> u32 {
    5
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: default_backoff_base(),
            multiplier: default_multiplier(),
            max_failures: default_max_failures(),
        }
    }
}

/// Silence thresholds; the three timeouts are independent of each other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessConfig {
    /// Until the first event of a fresh attach
    #[serde(default = "default_initial_timeout", with = "duration::human")]
    pub initial_timeout: Duration,

    /// Until the first event of a run resumed after recovery
    #[serde(default = "default_resumed_timeout", with = "duration::human")]
    pub resumed_timeout: Duration,

    /// After the first event
    #[serde(default = "default_steady_timeout", with = "duration::human")]
    pub steady_timeout: Duration,

    #[serde(default = "default_check_interval", with = "duration::human")]
    pub check_interval: Duration,
}

fn default_initial_timeout() -> Duration {
    Duration::from_secs(150)
}

fn default_resumed_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_steady_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            initial_timeout: default_initial_timeout(),
            resumed_timeout: default_resumed_timeout(),
            steady_timeout: default_steady_timeout(),
            check_interval: default_check_interval(),
        }
    }
}

/// What happens once an execution finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// View opened after a successful run
    #[serde(default = "default_navigate_to")]
    pub navigate_to: String,

    #[serde(default = "default_navigate_delay", with = "duration::human")]
    pub navigate_delay: Duration,

    /// Delay before the tracker returns to idle after finishing
    #[serde(default = "default_reset_delay", with = "duration::human")]
    pub reset_delay: Duration,

    /// Cached views refreshed after a successful run
    #[serde(default = "default_invalidate")]
    pub invalidate: Vec<String>,
}

fn default_navigate_to() -> String {
    "results".to_string()
}

fn default_navigate_delay() -> Duration {
    Duration::from_millis(1500)
}

fn default_reset_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_invalidate() -> Vec<String> {
    vec!["executions".to_string(), "results".to_string()]
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            navigate_to: default_navigate_to(),
            navigate_delay: default_navigate_delay(),
            reset_delay: default_reset_delay(),
            invalidate: default_invalidate(),
        }
    }
}

/// Where the active execution id is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    File {
        #[serde(default = "default_store_path")]
        path: String,
        #[serde(default = "default_store_key")]
        key: String,
    },
}

fn default_store_path() -> String {
    ".execution-tracker/state.json".to_string()
}

fn default_store_key() -> String {
    "active_execution_id".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: default_store_path(),
            key: default_store_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default = "default_poll_interval", with = "duration::human")]
    pub poll_interval: Duration,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub staleness: StalenessConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    /// Upper bound for the liveness check during recovery
    #[serde(default = "default_verify_timeout", with = "duration::human")]
    pub verify_timeout: Duration,

    #[serde(default)]
    pub store: StoreConfig,

    /// Ordered name -> label table
    #[serde(default)]
    pub steps: StepCatalog,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_verify_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            transport: TransportKind::default(),
            poll_interval: default_poll_interval(),
            backoff: BackoffConfig::default(),
            staleness: StalenessConfig::default(),
            completion: CompletionConfig::default(),
            verify_timeout: default_verify_timeout(),
            store: StoreConfig::default(),
            steps: StepCatalog::default(),
        }
    }
}

impl TrackerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content).map_err(|error| ConfigError::Yaml {
            file: path.display().to_string(),
            error,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(content).map_err(|error| ConfigError::Yaml {
            file: "<inline>".to_string(),
            error,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Reject values the transports and timers cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.staleness.check_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "staleness.check_interval must be greater than zero".to_string(),
            ));
        }
        let multiplier = self.backoff.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff.multiplier must be a finite number >= 1.0, got {}",
                multiplier
            )));
        }
        if self.backoff.max_failures == 0 {
            return Err(ConfigError::Invalid(
                "backoff.max_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
