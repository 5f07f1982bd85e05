//! TOML-based configuration for a party node.
//!
//! Example file:
//!
//! ```toml
//! [node]
//! log_level = "debug"
//! hostname = "Friday night lobby"
//!
//! [discovery]
//! query_timeout_secs = 10
//! sweep_interval_ms = 1000
//! max_pending_queries = 1024
//!
//! [join]
//! mode_switch_delay_secs = 5
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so an empty file, a file
//! with only some sections, or no file at all all yield a working node.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::query_registry::DEFAULT_CAPACITY;
use crate::application::{join::DEFAULT_MODE_SWITCH_DELAY, sweeper};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub join: JoinSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Advertised as `hostname` in `infoResponse`.
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_max_pending_queries")]
    pub max_pending_queries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinSection {
    #[serde(default = "default_mode_switch_delay_secs")]
    pub mode_switch_delay_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_hostname() -> String {
    "party-node".to_string()
}
fn default_query_timeout_secs() -> u64 {
    sweeper::DEFAULT_QUERY_TIMEOUT.as_secs()
}
fn default_sweep_interval_ms() -> u64 {
    sweeper::DEFAULT_SWEEP_INTERVAL.as_millis() as u64
}
fn default_max_pending_queries() -> usize {
    DEFAULT_CAPACITY
}
fn default_mode_switch_delay_secs() -> u64 {
    DEFAULT_MODE_SWITCH_DELAY.as_secs()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            hostname: default_hostname(),
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_pending_queries: default_max_pending_queries(),
        }
    }
}

impl Default for JoinSection {
    fn default() -> Self {
        Self {
            mode_switch_delay_secs: default_mode_switch_delay_secs(),
        }
    }
}

impl DiscoverySection {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl JoinSection {
    pub fn mode_switch_delay(&self) -> Duration {
        Duration::from_secs(self.mode_switch_delay_secs)
    }
}

impl NodeConfig {
    /// Rejects values the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.query_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "discovery.query_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.discovery.max_pending_queries == 0 {
            return Err(ConfigError::Invalid(
                "discovery.max_pending_queries must be at least 1".to_string(),
            ));
        }
        // A zero period panics inside `tokio::time::interval`.
        if self.discovery.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "discovery.sweep_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads and validates `NodeConfig` from `path`, returning the defaults if
/// the file does not exist.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<NodeConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => NodeConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
