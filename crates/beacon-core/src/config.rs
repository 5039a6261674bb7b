use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Queue names, shared by producers (trigger service) and consumers (workers).
pub const TRIGGER_QUEUE: &str = "trigger";
pub const ARCHIVE_QUEUE: &str = "archive";

pub const DEFAULT_CACHE_TTL_SECS: u64 = 600; // cached event pages live 10 minutes
pub const DEFAULT_SCAN_COUNT: usize = 100; // keys per SCAN round-trip
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ARCHIVE_AFTER_MINS: i64 = 120;
pub const DEFAULT_DELETE_AFTER_HOURS: i64 = 48;
pub const DEFAULT_TEST_RETENTION_HOURS: i64 = 48;
pub const DEFAULT_SWEEP_EVERY_MINS: i64 = 2;

/// Top-level config (beacon.toml + BEACON_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process cache; only coherent when the request layer and the
    /// workers share one process.
    Memory,
    /// Shared Redis instance, reachable from every process.
    #[default]
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: default_redis_url(),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Sleep between claim attempts when a queue has nothing due.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on a single outbound API trigger call.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

/// Event log ageing windows. All windows are measured from `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_archive_after")]
    pub archive_after_mins: i64,
    #[serde(default = "default_delete_after")]
    pub delete_after_hours: i64,
    #[serde(default = "default_test_retention")]
    pub test_retention_hours: i64,
    #[serde(default = "default_sweep_every")]
    pub sweep_every_mins: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            archive_after_mins: DEFAULT_ARCHIVE_AFTER_MINS,
            delete_after_hours: DEFAULT_DELETE_AFTER_HOURS,
            test_retention_hours: DEFAULT_TEST_RETENTION_HOURS,
            sweep_every_mins: DEFAULT_SWEEP_EVERY_MINS,
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.beacon/beacon.db", home)
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_scan_count() -> usize {
    DEFAULT_SCAN_COUNT
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}
fn default_user_agent() -> String {
    format!("beacon/{}", env!("CARGO_PKG_VERSION"))
}
fn default_archive_after() -> i64 {
    DEFAULT_ARCHIVE_AFTER_MINS
}
fn default_delete_after() -> i64 {
    DEFAULT_DELETE_AFTER_HOURS
}
fn default_test_retention() -> i64 {
    DEFAULT_TEST_RETENTION_HOURS
}
fn default_sweep_every() -> i64 {
    DEFAULT_SWEEP_EVERY_MINS
}

impl BeaconConfig {
    /// Load config from a TOML file with BEACON_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `BEACON_WORKER__POLL_INTERVAL_MS=250`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.beacon/beacon.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::BeaconError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BEACON_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.beacon/beacon.toml", home)
}
