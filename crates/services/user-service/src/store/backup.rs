//! Periodic snapshots of the primary table with rotation.
//!
//! The scheduler task is the only actor that runs concurrently with
//! foreground operations. It takes the shared read lock just long enough to
//! clone the records, then writes to the `users_backup_*` keyspace, which no
//! other code path touches.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use common::AppResult;
use domain::{UserRecord, KEY_BACKUP_PREFIX};

use super::table::UserTable;
use crate::infra::KeyValueStore;

/// Immutable copy of the primary table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub timestamp: DateTime<Utc>,
    pub count: usize,
    pub users: Vec<UserRecord>,
}

/// Writes snapshots and rotates old ones.
pub struct Snapshotter {
    table: Arc<RwLock<UserTable>>,
    kv: Arc<dyn KeyValueStore>,
    retain: usize,
    last_stamp: AtomicI64,
}

impl Snapshotter {
    pub fn new(table: Arc<RwLock<UserTable>>, kv: Arc<dyn KeyValueStore>, retain: usize) -> Self {
        Self {
            table,
            kv,
            retain,
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Write one snapshot, then delete all but the newest `retain`.
    /// Returns the key the snapshot was stored under.
    pub async fn snapshot(&self) -> AppResult<String> {
        let users: Vec<UserRecord> = {
            let table = self.table.read().await;
            table.records().cloned().collect()
        };

        let now = Utc::now();
        let key = self.next_key(now);
        let snapshot = BackupSnapshot {
            timestamp: now,
            count: users.len(),
            users,
        };

        self.kv.set(&key, serde_json::to_string(&snapshot)?).await?;
        tracing::debug!(key = %key, users = snapshot.count, "Backup snapshot written");

        self.rotate().await?;
        Ok(key)
    }

    /// Backup keys, oldest first.
    pub async fn list(&self) -> AppResult<Vec<String>> {
        let mut keys = self.kv.keys(KEY_BACKUP_PREFIX).await?;
        keys.sort();
        Ok(keys)
    }

    pub async fn load(&self, key: &str) -> AppResult<Option<BackupSnapshot>> {
        if !key.starts_with(KEY_BACKUP_PREFIX) {
            return Ok(None);
        }
        match self.kv.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn rotate(&self) -> AppResult<()> {
        let keys = self.list().await?;
        let excess = keys.len().saturating_sub(self.retain);

        for key in keys.iter().take(excess) {
            self.kv.delete(key).await?;
            tracing::debug!(key = %key, "Old backup removed");
        }
        Ok(())
    }

    /// Zero-padded microsecond stamp, strictly increasing within this process
    /// so two snapshots in the same clock tick never share a key.
    fn next_key(&self, now: DateTime<Utc>) -> String {
        let mut stamp = now.timestamp_micros();
        let mut last = self.last_stamp.load(Ordering::Acquire);
        loop {
            if stamp <= last {
                stamp = last + 1;
            }
            match self
                .last_stamp
                .compare_exchange(last, stamp, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => last = actual,
            }
        }
        format!("{}{:020}", KEY_BACKUP_PREFIX, stamp)
    }
}

/// Handle to the recurring backup task.
///
/// Must be stopped before the store is discarded; dropping the handle stops
/// it as well.
pub struct BackupScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackupScheduler {
    /// A scheduler with no running task.
    pub fn idle() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Spawn the recurring task. A zero period disables backups.
    pub fn start(snapshotter: Arc<Snapshotter>, period: Duration) -> Self {
        if period.is_zero() {
            tracing::warn!("Backup interval is zero, scheduled backups disabled");
            return Self::idle();
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match snapshotter.snapshot().await {
                    Ok(key) => tracing::info!(key = %key, "Scheduled backup complete"),
                    Err(e) => tracing::error!(error = %e, "Scheduled backup failed"),
                }
            }
        });

        tracing::info!(period_secs = period.as_secs(), "Backup scheduler started");
        Self {
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Cancel the task. Safe to call repeatedly; existing snapshots stay.
    pub fn stop(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("Backup scheduler stopped");
        }
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::MemoryKv;
    use domain::NewUser;

    fn snapshotter(kv: Arc<MemoryKv>, retain: usize) -> Snapshotter {
        let mut table = UserTable::new();
        table
            .insert_new(NewUser::new("b@example.com", "Backup Me", "pw"), 10, Utc::now())
            .unwrap();
        Snapshotter::new(Arc::new(RwLock::new(table)), kv, retain)
    }

    #[test]
    fn test_keys_strictly_increase() {
        let kv = Arc::new(MemoryKv::new());
        let snap = snapshotter(kv, 3);
        let now = Utc::now();

        let a = snap.next_key(now);
        let b = snap.next_key(now);
        let c = snap.next_key(now - chrono::Duration::seconds(5));

        assert!(a < b && b < c, "{} {} {}", a, b, c);
        assert!(a.starts_with(KEY_BACKUP_PREFIX));
    }

    #[tokio::test]
    async fn test_rotation_keeps_newest() {
        let kv = Arc::new(MemoryKv::new());
        let snap = snapshotter(kv, 3);

        let mut written = Vec::new();
        for _ in 0..5 {
            written.push(snap.snapshot().await.unwrap());
        }

        let remaining = snap.list().await.unwrap();
        assert_eq!(remaining, written[2..].to_vec());

        let latest = snap.load(&remaining[2]).await.unwrap().unwrap();
        assert_eq!(latest.count, 1);
        assert_eq!(latest.users[0].email, "b@example.com");
    }

    #[tokio::test]
    async fn test_load_ignores_foreign_keys() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("users_db", "{}".to_string()).await.unwrap();
        let snap = snapshotter(kv, 3);

        assert!(snap.load("users_db").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let kv = Arc::new(MemoryKv::new());
        let snap = Arc::new(snapshotter(kv, 3));
        let scheduler = BackupScheduler::start(snap, Duration::from_secs(3600));

        assert!(scheduler.is_running());
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_zero_period_never_starts() {
        let kv = Arc::new(MemoryKv::new());
        let snap = Arc::new(snapshotter(kv, 3));
        let scheduler = BackupScheduler::start(snap, Duration::ZERO);
        assert!(!scheduler.is_running());
    }
}
