//! Hierarchical settings merged by `figment`: compiled-in defaults,
//! `conclave.yaml`, `conclave.local.yaml`, `CONCLAVE_`-prefixed
//! environment variables.

pub mod loader;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infrastructure::logging::LogConfig;

pub use loader::{ConfigError, ConfigLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackend {
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_true")]
    pub ha_enabled: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
    #[serde(default = "default_lock_ttl_ms")]
    pub default_lock_ttl_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ha_enabled: default_true(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            lease_ttl_ms: default_lease_ttl_ms(),
            default_lock_ttl_ms: default_lock_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    #[serde(default = "default_app_prefix")]
    pub app_prefix: String,
    #[serde(default)]
    pub kv_backend: KvBackend,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

impl Default for KvBackend {
    fn default() -> Self {
        Self::Memory
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            app_prefix: default_app_prefix(),
            kv_backend: KvBackend::default(),
            cluster: ClusterConfig::default(),
            scheduler: SchedulerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

fn default_instance_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_app_prefix() -> String {
    "conclave".to_string()
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_health_timeout_ms() -> u64 {
    15_000
}

fn default_lease_ttl_ms() -> u64 {
    10_000
}

fn default_lock_ttl_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_database_path() -> String {
    "sqlite:.conclave/conclave.db".to_string()
}
