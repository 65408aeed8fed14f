//! Shared configuration structures.

use std::time::Duration;

use domain::{
    DEFAULT_BACKUP_INTERVAL_SECONDS, DEFAULT_BACKUP_RETAIN, DEFAULT_MAX_USERS,
    INACTIVE_RETENTION_DAYS,
};
use serde::{Deserialize, Serialize};

/// User store behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Maximum number of records
    pub capacity: usize,
    /// Seconds between backup snapshots
    pub backup_interval_seconds: u64,
    /// Number of snapshots kept after rotation
    pub backup_retain: usize,
    /// Idle days after which inactive records may be purged
    pub inactive_retention_days: i64,
    /// Create the baseline admin/demo accounts when missing
    pub seed_defaults: bool,
}

impl StoreConfig {
    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_seconds)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAX_USERS,
            backup_interval_seconds: DEFAULT_BACKUP_INTERVAL_SECONDS,
            backup_retain: DEFAULT_BACKUP_RETAIN,
            inactive_retention_days: INACTIVE_RETENTION_DAYS,
            seed_defaults: true,
        }
    }
}

/// Redis cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}
