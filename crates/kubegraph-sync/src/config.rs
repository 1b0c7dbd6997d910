//! Configuration for the kubegraph-sync daemon.

use std::time::Duration;

use serde::Deserialize;

use kubegraph_graph::GraphConfig;

use crate::error::Result;

/// Top-level configuration.
///
/// Loaded from `<prefix>.toml` and `KUBEGRAPH__` environment variables
/// (`KUBEGRAPH__SYNC__NAMESPACE`, `KUBEGRAPH__NEO4J__URI`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub neo4j: GraphConfig,
}

/// Where synchronized nodes are written.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Neo4j,
    /// In-process store; nothing outlives the process.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Restrict the watch to one namespace. Cluster-wide when unset.
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub backend: StoreBackend,

    /// Attempts per event for retryable failures, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            backend: StoreBackend::default(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Exponential backoff for retryable synchronization failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl AppConfig {
    /// Load from an optional `<file_prefix>.toml` overlaid by the environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("KUBEGRAPH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Parse a TOML document without consulting files or the environment.
    pub fn from_toml(source: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}
