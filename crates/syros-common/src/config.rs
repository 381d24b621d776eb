//! ---
//! syros_section: "01-core-functionality"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Shared primitives and utilities for the indexer runtime."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::{LogFormat, LogRotation};

fn default_database_directory() -> PathBuf {
    PathBuf::from("target/syros-db")
}

fn default_database_name() -> String {
    "syros".to_owned()
}

fn default_max_connections() -> usize {
    16
}

fn default_database_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_retention_collections() -> Vec<String> {
    [
        "hosts",
        "containers",
        "checks",
        "checks_log",
        "cluster_checks",
        "cluster_checks_log",
        "syros_services",
        "vsphere_hosts",
        "vsphere_dstores",
        "vsphere_vms",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_log_stdout() -> bool {
    true
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

/// Primary configuration object for the indexer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`IndexerConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedIndexerConfig {
    pub config: IndexerConfig,
    pub source: PathBuf,
}

impl IndexerConfig {
    pub const ENV_CONFIG_PATH: &str = "SYROS_CONFIG";

    /// Load configuration from disk, respecting the `SYROS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedIndexerConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedIndexerConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedIndexerConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<IndexerConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.retention.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for IndexerConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: IndexerConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Parent directory of the database.
    #[serde(default = "default_database_directory")]
    pub directory: PathBuf,
    /// Database name; the store lives in `directory/name`.
    #[serde(default = "default_database_name")]
    pub name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long an operation waits for a pooled connection.
    #[serde(default = "default_database_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            directory: default_database_directory(),
            name: default_database_name(),
            max_connections: default_max_connections(),
            timeout: default_database_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("database name must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("database max_connections must be at least 1"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Age in minutes after which documents are removed; `<= 0` disables retention.
    #[serde(default)]
    pub stale_minutes: i64,
    #[serde(default = "default_sweep_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub interval: Duration,
    #[serde(default = "default_retention_collections")]
    pub collections: Vec<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            stale_minutes: 0,
            interval: default_sweep_interval(),
            collections: default_retention_collections(),
        }
    }
}

impl RetentionConfig {
    pub fn enabled(&self) -> bool {
        self.stale_minutes > 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("retention interval must be at least one second"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub rotation: LogRotation,
    /// Mirror events to stdout in addition to the log file.
    #[serde(default = "default_log_stdout")]
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            rotation: LogRotation::default(),
            stdout: default_log_stdout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}
