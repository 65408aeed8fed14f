//! Indexed, persisted user store.
//!
//! `UserStore` owns the primary table and its indexes behind one
//! reader-writer lock. Every mutation updates the table and indexes and
//! persists while still holding the write lock, so readers never observe a
//! half-applied change. Persistence problems are logged and self-healed,
//! never returned to callers; only capacity and email conflicts fail loudly.

mod backup;
mod index;
mod persistence;
mod search;
mod session;
mod stats;
mod table;
mod transfer;

pub use backup::{BackupScheduler, BackupSnapshot, Snapshotter};
pub use index::{DerivedIndexes, EmailIndex};
pub use persistence::{load_table, save_table, PrimaryBlob, SaveOutcome};
pub use session::SessionCache;
pub use stats::UserStats;
pub use table::UserTable;
pub use transfer::{export_csv, parse_import, ImportReport, ImportRow};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use common::{AppError, AppResult, StoreConfig};
use domain::{
    DomainError, NewUser, UpdateUser, UserRecord, UserRole, UserView, IMPORT_PLACEHOLDER_CREDENTIAL,
    SEED_ADMIN_CREDENTIAL, SEED_ADMIN_EMAIL, SEED_ADMIN_NAME, SEED_DEMO_CREDENTIAL,
    SEED_DEMO_EMAIL, SEED_DEMO_NAME,
};

use crate::infra::KeyValueStore;

/// The user store. Construct once and share as `Arc<UserStore>`.
pub struct UserStore {
    table: Arc<RwLock<UserTable>>,
    kv: Arc<dyn KeyValueStore>,
    config: StoreConfig,
    session: SessionCache,
    snapshotter: Arc<Snapshotter>,
    scheduler: BackupScheduler,
}

impl UserStore {
    /// Load persisted state, seed baseline accounts and start backups.
    ///
    /// Never fails: unreadable state degrades to an empty table.
    /// Must be called from within a tokio runtime.
    pub async fn open(kv: Arc<dyn KeyValueStore>, config: StoreConfig) -> Self {
        let table = Arc::new(RwLock::new(load_table(kv.as_ref()).await));
        let session = SessionCache::load(kv.clone()).await;
        let snapshotter = Arc::new(Snapshotter::new(
            table.clone(),
            kv.clone(),
            config.backup_retain,
        ));

        let mut store = Self {
            table,
            kv,
            config,
            session,
            snapshotter,
            scheduler: BackupScheduler::idle(),
        };

        if store.config.seed_defaults {
            store.seed_defaults().await;
        }
        store.scheduler =
            BackupScheduler::start(store.snapshotter.clone(), store.config.backup_interval());

        store
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create a record. Fails with `CapacityExceeded` at the ceiling and
    /// `Conflict` if the normalized email is taken.
    pub async fn create(&self, input: NewUser) -> AppResult<UserView> {
        let mut table = self.table.write().await;
        let view = table
            .insert_new(input, self.config.capacity, Utc::now())?
            .view();
        self.persist(&mut table).await;

        tracing::info!(user_id = %view.id, role = %view.role, "User created");
        Ok(view)
    }

    pub async fn get(&self, id: Uuid) -> Option<UserView> {
        self.table.read().await.get(id).map(UserRecord::view)
    }

    /// Full record including the credential, for credential checks only.
    pub async fn get_by_email_with_credential(&self, email: &str) -> Option<UserRecord> {
        self.table.read().await.get_by_email(email).cloned()
    }

    /// Merge `patch` into a record. `Ok(None)` if the id is unknown.
    pub async fn update(&self, id: Uuid, patch: UpdateUser) -> AppResult<Option<UserView>> {
        let mut table = self.table.write().await;
        let Some(view) = table.apply_update(id, patch)?.map(UserRecord::view) else {
            return Ok(None);
        };
        self.persist(&mut table).await;

        tracing::info!(user_id = %id, "User updated");
        Ok(Some(view))
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        let mut table = self.table.write().await;
        if table.remove(id).is_none() {
            return false;
        }
        self.persist(&mut table).await;

        tracing::info!(user_id = %id, "User deleted");
        true
    }

    pub async fn set_active(&self, id: Uuid) -> bool {
        self.set_activity(id, true).await
    }

    pub async fn set_inactive(&self, id: Uuid) -> bool {
        self.set_activity(id, false).await
    }

    async fn set_activity(&self, id: Uuid, active: bool) -> bool {
        let mut table = self.table.write().await;
        if !table.set_active(id, active) {
            return false;
        }
        self.persist(&mut table).await;
        true
    }

    /// Stamp the last-login time. Unknown ids are ignored.
    pub async fn touch_last_login(&self, id: Uuid) {
        let mut table = self.table.write().await;
        if table.touch_last_login(id, Utc::now()) {
            self.persist(&mut table).await;
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn search(&self, query: &str) -> Vec<UserView> {
        views(self.table.read().await.search(query))
    }

    pub async fn by_role(&self, role: UserRole) -> Vec<UserView> {
        views(self.table.read().await.by_role(role))
    }

    pub async fn by_creation_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<UserView> {
        views(self.table.read().await.by_creation_range(start, end))
    }

    /// Every record, oldest first.
    pub async fn get_all(&self) -> Vec<UserView> {
        views(self.table.read().await.all())
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn stats(&self) -> UserStats {
        let table = self.table.read().await;
        UserStats::compute(&table, self.config.capacity, Utc::now())
    }

    // =========================================================================
    // Import / Export
    // =========================================================================

    pub async fn export_csv(&self) -> String {
        export_csv(self.table.read().await.all())
    }

    /// Import records from tabular text. Bad lines are reported, not fatal.
    pub async fn import_csv(&self, text: &str) -> ImportReport {
        let mut report = ImportReport::default();
        let mut table = self.table.write().await;
        let now = Utc::now();

        for row in parse_import(text) {
            let row = match row {
                Ok(row) => row,
                Err(message) => {
                    report.errors.push(message);
                    continue;
                }
            };

            if table.contains_email(&row.email) {
                report
                    .errors
                    .push(format!("Line {}: email {} already exists", row.line, row.email));
                continue;
            }

            let input = NewUser::new(row.email, row.name, IMPORT_PLACEHOLDER_CREDENTIAL)
                .with_role(row.role);
            match table.insert_new(input, self.config.capacity, now) {
                Ok(_) => report.imported += 1,
                Err(e) => report.errors.push(format!("Line {}: {}", row.line, e)),
            }
        }

        if report.imported > 0 {
            self.persist(&mut table).await;
        }

        tracing::info!(
            imported = report.imported,
            errors = report.errors.len(),
            "Import finished"
        );
        report
    }

    // =========================================================================
    // Session Cache
    // =========================================================================

    pub async fn save_current_session(&self, user: UserView) {
        self.session.save(user).await;
    }

    pub async fn current_session(&self) -> Option<UserView> {
        self.session.get().await
    }

    pub async fn clear_current_session(&self) {
        self.session.clear().await;
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// Run one snapshot + rotation cycle immediately.
    pub async fn backup_now(&self) -> AppResult<String> {
        self.snapshotter.snapshot().await
    }

    /// Backup keys, oldest first.
    pub async fn list_backups(&self) -> AppResult<Vec<String>> {
        self.snapshotter.list().await
    }

    /// Replace the table with a snapshot's records and rebuild all indexes.
    pub async fn restore_backup(&self, key: &str) -> AppResult<usize> {
        let snapshot = self
            .snapshotter
            .load(key)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("backup {}", key)))?;

        if snapshot.users.len() > self.config.capacity {
            return Err(AppError::CapacityExceeded(self.config.capacity));
        }

        let mut table = self.table.write().await;
        table.replace_records(snapshot.users);
        self.persist(&mut table).await;

        tracing::info!(key = %key, users = table.len(), "Backup restored");
        Ok(table.len())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rebuild role and name-token indexes from the primary table.
    pub async fn rebuild_indexes(&self) {
        let mut table = self.table.write().await;
        table.rebuild_indexes();
        self.persist(&mut table).await;
    }

    /// List inconsistencies between the table and its indexes.
    pub async fn verify_indexes(&self) -> Vec<String> {
        self.table.read().await.index_violations()
    }

    /// Delete inactive records idle past the retention horizon.
    pub async fn purge_stale_inactive(&self) -> usize {
        let mut table = self.table.write().await;
        let removed = table.purge_stale(Utc::now(), self.retention());
        if removed > 0 {
            self.persist(&mut table).await;
            tracing::info!(removed, "Purged stale inactive users");
        }
        removed
    }

    /// Stop the backup timer. Idempotent; snapshots are kept.
    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    pub fn backups_running(&self) -> bool {
        self.scheduler.is_running()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn retention(&self) -> Duration {
        Duration::days(self.config.inactive_retention_days)
    }

    /// Best-effort save. On failure, purge stale inactive records once and
    /// retry; the retry never triggers another purge.
    async fn persist(&self, table: &mut UserTable) {
        let Err(e) = save_table(self.kv.as_ref(), table, self.config.capacity).await else {
            return;
        };
        tracing::error!(error = %e, "Failed to persist users, purging stale inactive records");

        let removed = table.purge_stale(Utc::now(), self.retention());
        if removed == 0 {
            return;
        }
        tracing::info!(removed, "Purged stale inactive users after failed save");

        if let Err(e) = save_table(self.kv.as_ref(), table, self.config.capacity).await {
            tracing::error!(error = %e, "Save after cleanup failed, giving up");
        }
    }

    async fn seed_defaults(&self) {
        let seeds = [
            (SEED_ADMIN_EMAIL, SEED_ADMIN_NAME, SEED_ADMIN_CREDENTIAL, UserRole::Admin),
            (SEED_DEMO_EMAIL, SEED_DEMO_NAME, SEED_DEMO_CREDENTIAL, UserRole::User),
        ];

        for (email, name, credential, role) in seeds {
            if self.table.read().await.contains_email(email) {
                continue;
            }
            let input = NewUser::new(email, name, credential).with_role(role);
            if let Err(e) = self.create(input).await {
                tracing::warn!(email = %email, error = %e, "Could not seed account");
            }
        }
    }
}

fn views(users: Vec<&UserRecord>) -> Vec<UserView> {
    users.into_iter().map(UserRecord::view).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::infra::MockKeyValueStore;
    use domain::KEY_PRIMARY;

    fn config() -> StoreConfig {
        StoreConfig {
            seed_defaults: false,
            backup_interval_seconds: 0,
            ..StoreConfig::default()
        }
    }

    fn stale_inactive_user() -> UserRecord {
        let created = Utc::now() - Duration::days(800);
        let mut user = UserRecord::new(
            Uuid::new_v4(),
            NewUser::new("gone@example.com", "Long Gone", "pw"),
            created,
        );
        user.is_active = false;
        user
    }

    fn blob_with(user: &UserRecord) -> String {
        let blob = PrimaryBlob {
            users: HashMap::from([(user.id, user.clone())]),
            email_index: HashMap::from([(user.email.clone(), user.id)]),
        };
        serde_json::to_string(&blob).unwrap()
    }

    #[tokio::test]
    async fn test_failed_save_purges_stale_and_keeps_going() {
        let stale = stale_inactive_user();
        let blob = blob_with(&stale);

        let mut kv = MockKeyValueStore::new();
        kv.expect_get()
            .returning(move |key| Ok((key == KEY_PRIMARY).then(|| blob.clone())));
        kv.expect_keys().returning(|_| Ok(vec![]));
        // Initial attempt plus exactly one retry after the purge
        kv.expect_set()
            .times(2)
            .returning(|_, _| Err(AppError::storage("disk full")));

        let store = UserStore::open(Arc::new(kv), config()).await;
        assert_eq!(store.count().await, 1);

        let created = store
            .create(NewUser::new("new@example.com", "New Person", "pw"))
            .await
            .unwrap();

        assert_eq!(store.count().await, 1);
        assert!(store.get(stale.id).await.is_none());
        assert!(store.get(created.id).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_save_without_stale_records_does_not_retry() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get().returning(|_| Ok(None));
        kv.expect_set()
            .times(1)
            .returning(|_, _| Err(AppError::storage("read-only")));

        let store = UserStore::open(Arc::new(kv), config()).await;
        let user = store
            .create(NewUser::new("kept@example.com", "Kept", "pw"))
            .await
            .unwrap();

        assert_eq!(store.get(user.id).await.map(|u| u.email), Some("kept@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_read_failure_opens_empty() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get()
            .returning(|_| Err(AppError::storage("connection refused")));

        let store = UserStore::open(Arc::new(kv), config()).await;

        assert_eq!(store.count().await, 0);
        assert!(store.current_session().await.is_none());
    }

    #[tokio::test]
    async fn test_purge_stale_inactive_spares_active_and_recent() {
        let stale = stale_inactive_user();
        let blob = blob_with(&stale);

        let mut kv = MockKeyValueStore::new();
        kv.expect_get()
            .returning(move |key| Ok((key == KEY_PRIMARY).then(|| blob.clone())));
        kv.expect_set().returning(|_, _| Ok(()));

        let store = UserStore::open(Arc::new(kv), config()).await;
        let fresh = store
            .create(NewUser::new("fresh@example.com", "Fresh", "pw"))
            .await
            .unwrap();
        store.set_inactive(fresh.id).await;

        assert_eq!(store.purge_stale_inactive().await, 1);
        assert_eq!(store.purge_stale_inactive().await, 0);
        assert!(store.get(fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn test_import_persists_once() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get().returning(|_| Ok(None));
        // One save writes the primary and derived blobs
        kv.expect_set().times(2).returning(|_, _| Ok(()));

        let store = UserStore::open(Arc::new(kv), config()).await;
        let report = store
            .import_csv("ID,Name,Email\n1,One,one@example.com\n2,Two,two@example.com\n")
            .await;

        assert_eq!(report.imported, 2);
    }
}
