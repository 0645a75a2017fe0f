use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Validation bounds — shared by the service layer and its tests
pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 255;
pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;
pub const MAX_RETRIES_LIMIT: u32 = 10;
pub const TIMEOUT_MIN_SECS: u64 = 30;
pub const TIMEOUT_MAX_SECS: u64 = 24 * 3600; // 24 hours
pub const INTERVAL_MIN_SECS: u32 = 60;
pub const INTERVAL_MAX_SECS: u32 = 7 * 24 * 3600; // 7 days
pub const PAGE_SIZE_MAX: u32 = 100;

/// Top-level config (chronod.toml + CHRONOD_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChronodConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for ChronodConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Tunables for the scheduling engine and executor defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick cadence of the scheduling loop, in seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// System-wide cap on concurrently executing jobs.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrent_executions: usize,
    /// Applied when a job is created without max_retries.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Applied when a job is created without timeout_seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_seconds: u64,
    /// Applied when a job is created without a priority.
    #[serde(default = "default_priority")]
    pub default_priority: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            max_concurrent_executions: default_max_concurrency(),
            default_max_retries: default_max_retries(),
            default_timeout_seconds: default_timeout_secs(),
            default_priority: default_priority(),
        }
    }
}

fn default_tick_interval() -> u64 {
    1
}
fn default_max_concurrency() -> usize {
    20
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    3600
}
fn default_priority() -> u8 {
    5
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chronod/chronod.db", home)
}

impl ChronodConfig {
    /// Load config from a TOML file with CHRONOD_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.chronod/chronod.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ChronodConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHRONOD_").split("_"))
            .extract()
            .map_err(|e| crate::error::ChronodError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chronod/chronod.toml", home)
}
