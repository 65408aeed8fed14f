//! User service configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use common::{AppError, CacheConfig, StoreConfig};

/// Where the store keeps its blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(AppError::validation(format!("unknown store backend '{}'", other))),
        }
    }
}

/// User service configuration.
#[derive(Debug, Clone)]
pub struct UserServiceConfig {
    /// Storage backend
    pub backend: StoreBackend,
    /// Directory for the file backend
    pub data_dir: PathBuf,
    /// Redis connection for the redis backend
    pub cache: CacheConfig,
    /// Store behaviour
    pub store: StoreConfig,
}

impl UserServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            backend: env::var("USER_STORE_BACKEND")
                .ok()
                .and_then(|v| {
                    v.parse()
                        .map_err(|e| tracing::warn!(error = %e, "Ignoring USER_STORE_BACKEND"))
                        .ok()
                })
                .unwrap_or(defaults.backend),
            data_dir: env::var("USER_STORE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            cache: CacheConfig {
                url: env::var("USER_STORE_REDIS_URL")
                    .or_else(|_| env::var("REDIS_URL"))
                    .unwrap_or(defaults.cache.url),
            },
            store: StoreConfig {
                capacity: parse_env("USER_STORE_CAPACITY").unwrap_or(defaults.store.capacity),
                backup_interval_seconds: parse_env("USER_STORE_BACKUP_INTERVAL_SECS")
                    .unwrap_or(defaults.store.backup_interval_seconds),
                backup_retain: parse_env("USER_STORE_BACKUP_RETAIN")
                    .unwrap_or(defaults.store.backup_retain),
                inactive_retention_days: parse_env("USER_STORE_RETENTION_DAYS")
                    .unwrap_or(defaults.store.inactive_retention_days),
                seed_defaults: parse_env("USER_STORE_SEED_DEFAULTS")
                    .unwrap_or(defaults.store.seed_defaults),
            },
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for UserServiceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            data_dir: PathBuf::from("./data"),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
