use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

use crate::error::ConfigurationError;
use crate::exporter::ExporterConfig;
use crate::model::{StorageDevice, TaskTemplate};
use crate::snmp::security::AlertSource;

/// Longest accepted collection or template interval, in seconds (one year)
pub const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database file
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::None
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./arraywatch.db")
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TrapReceiverConfig {
    #[serde(default = "crate::util::get_default_addr")]
    pub address: IpAddr,

    #[serde(default = "crate::util::get_default_port")]
    pub port: u16,

    /// Directory holding `<MODULE>.json` dictionary files
    #[serde(default = "default_dictionary_path")]
    pub dictionary_path: PathBuf,

    /// Dictionary modules to load on top of the built-in objects
    #[serde(default)]
    pub dictionaries: Vec<String>,

    /// Upper bound on notifications processed concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for TrapReceiverConfig {
    fn default() -> Self {
        Self {
            address: crate::util::get_default_addr(),
            port: crate::util::get_default_port(),
            dictionary_path: default_dictionary_path(),
            dictionaries: Vec::new(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_dictionary_path() -> PathBuf {
    PathBuf::from("./dictionaries")
}

fn default_max_in_flight() -> usize {
    64
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Seconds between two orchestrator runs
    #[serde(default = "default_collection_interval")]
    pub collection_interval: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            collection_interval: default_collection_interval(),
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_collection_interval() -> u64 {
    900
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

fn default_backoff_secs() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    /// Run at most one collection per storage at a time
    #[serde(default = "default_serialize_per_storage")]
    pub serialize_per_storage: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            serialize_per_storage: default_serialize_per_storage(),
        }
    }
}

fn default_serialize_per_storage() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct DriversConfig {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl DriversConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_call_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trap_receiver: TrapReceiverConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub collection: CollectionConfig,

    #[serde(default)]
    pub drivers: DriversConfig,

    #[serde(default)]
    pub exporters: Vec<ExporterConfig>,

    /// Storage configuration (optional - defaults to in-memory)
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub storages: Vec<StorageDevice>,

    #[serde(default)]
    pub alert_sources: Vec<AlertSource>,

    #[serde(default)]
    pub task_templates: Vec<TaskTemplate>,
}

impl Config {
    /// Rejects values that deserialize fine but cannot run
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.scheduler.workers == 0 {
            return Err(ConfigurationError::Invalid("scheduler.workers must be > 0".into()));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&self.scheduler.collection_interval) {
            return Err(ConfigurationError::Invalid(format!(
                "scheduler.collection_interval must be between 1 and {MAX_INTERVAL_SECS}"
            )));
        }
        if self.trap_receiver.max_in_flight == 0 {
            return Err(ConfigurationError::Invalid(
                "trap_receiver.max_in_flight must be > 0".into(),
            ));
        }
        if let Some(template) = self
            .task_templates
            .iter()
            .find(|t| !(1..=MAX_INTERVAL_SECS).contains(&t.interval))
        {
            return Err(ConfigurationError::Invalid(format!(
                "task template {} interval must be between 1 and {MAX_INTERVAL_SECS}",
                template.id
            )));
        }
        Ok(())
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigurationError> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
