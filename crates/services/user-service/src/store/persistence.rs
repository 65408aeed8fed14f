//! Persistence adapter: the table as two JSON blobs in a key-value store.
//!
//! - `users_db`      primary table + email index
//! - `users_indexes` role + name-token indexes
//!
//! Loads never fail: an unreadable blob degrades to empty state. Saves
//! return errors so the caller can decide on cleanup.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use common::AppResult;
use domain::{UserRecord, KEY_INDEXES, KEY_PRIMARY};

use super::index::{DerivedIndexes, EmailIndex};
use super::table::UserTable;
use crate::infra::KeyValueStore;

/// Serialized form of the primary table.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PrimaryBlob {
    pub users: HashMap<Uuid, UserRecord>,
    pub email_index: EmailIndex,
}

/// Result of a save attempt that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// Record count is over capacity; nothing was written
    SkippedOverCapacity,
}

/// Load both blobs and assemble a consistent table.
pub async fn load_table(kv: &dyn KeyValueStore) -> UserTable {
    let primary: PrimaryBlob = load_blob(kv, KEY_PRIMARY).await.unwrap_or_default();
    let stored_indexes: Option<DerivedIndexes> = load_blob(kv, KEY_INDEXES).await;

    let table = UserTable::from_parts(primary.users, primary.email_index);

    match stored_indexes {
        Some(stored) if stored == table.derived => {}
        Some(_) => tracing::debug!("Stored derived indexes were stale, using rebuilt copy"),
        None => tracing::debug!("No derived index blob, rebuilt from primary table"),
    }

    tracing::info!(users = table.len(), "User table loaded");
    table
}

/// Read and decode one blob. Missing and malformed blobs both yield `None`.
async fn load_blob<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match kv.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Failed to read blob, starting empty");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Malformed blob, starting empty");
            None
        }
    }
}

/// Write both blobs, unless the table holds more records than `capacity`.
pub async fn save_table(
    kv: &dyn KeyValueStore,
    table: &UserTable,
    capacity: usize,
) -> AppResult<SaveOutcome> {
    if table.len() > capacity {
        tracing::warn!(
            users = table.len(),
            capacity = capacity,
            "Record count exceeds capacity, skipping save"
        );
        return Ok(SaveOutcome::SkippedOverCapacity);
    }

    let primary = serde_json::to_string(&PrimaryBlobRef {
        users: &table.users,
        email_index: &table.emails,
    })?;
    let indexes = serde_json::to_string(&table.derived)?;

    kv.set(KEY_PRIMARY, primary).await?;
    kv.set(KEY_INDEXES, indexes).await?;

    tracing::debug!(users = table.len(), "User table saved");
    Ok(SaveOutcome::Written)
}

/// Approximate serialized size of the primary blob in bytes.
pub fn primary_blob_size(table: &UserTable) -> usize {
    serde_json::to_vec(&PrimaryBlobRef {
        users: &table.users,
        email_index: &table.emails,
    })
    .map(|bytes| bytes.len())
    .unwrap_or(0)
}

/// Borrowing twin of [`PrimaryBlob`] so saves don't clone the table.
#[derive(Serialize)]
struct PrimaryBlobRef<'a> {
    users: &'a HashMap<Uuid, UserRecord>,
    email_index: &'a EmailIndex,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::MemoryKv;
    use chrono::Utc;
    use domain::{NewUser, UserRole};

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let kv = MemoryKv::new();
        let mut table = UserTable::new();
        let now = Utc::now();
        let a = table
            .insert_new(NewUser::new("a@example.com", "Anita Sharma", "pw"), 10, now)
            .unwrap()
            .id;
        let b = table
            .insert_new(
                NewUser::new("b@example.com", "Rohan", "pw").with_role(UserRole::Admin),
                10,
                now,
            )
            .unwrap()
            .id;

        assert_eq!(save_table(&kv, &table, 10).await.unwrap(), SaveOutcome::Written);
        let loaded = load_table(&kv).await;

        assert_eq!(loaded.users, table.users);
        assert_eq!(loaded.emails, table.emails);
        assert_eq!(loaded.get(b).map(|u| u.role), Some(UserRole::Admin));
        assert_eq!(loaded.get_by_email("a@example.com").map(|u| u.id), Some(a));
    }

    #[tokio::test]
    async fn test_malformed_blob_loads_empty() {
        let kv = MemoryKv::new();
        kv.set(KEY_PRIMARY, "{not json".to_string()).await.unwrap();
        kv.set(KEY_INDEXES, "[]".to_string()).await.unwrap();

        let table = load_table(&kv).await;
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_missing_index_blob_is_rebuilt() {
        let kv = MemoryKv::new();
        let mut table = UserTable::new();
        table
            .insert_new(NewUser::new("t@example.com", "Token Name", "pw"), 10, Utc::now())
            .unwrap();
        save_table(&kv, &table, 10).await.unwrap();
        kv.delete(KEY_INDEXES).await.unwrap();

        let loaded = load_table(&kv).await;
        assert!(loaded.derived.name_tokens.contains_key("token"));
        assert!(loaded.index_violations().is_empty());
    }

    #[tokio::test]
    async fn test_save_skipped_over_capacity() {
        let kv = MemoryKv::new();
        let mut table = UserTable::new();
        let now = Utc::now();
        table.insert_new(NewUser::new("1@example.com", "One", "pw"), 10, now).unwrap();
        table.insert_new(NewUser::new("2@example.com", "Two", "pw"), 10, now).unwrap();

        let outcome = save_table(&kv, &table, 1).await.unwrap();
        assert_eq!(outcome, SaveOutcome::SkippedOverCapacity);
        assert!(kv.is_empty());
    }
}
