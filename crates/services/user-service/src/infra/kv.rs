//! Key-value storage boundary.
//!
//! The user store persists everything as string blobs under string keys.
//! Any backend that can get, set, delete and enumerate keys by prefix will do.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use common::{AppError, AppResult};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Durable string-keyed blob store.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: String) -> AppResult<()>;

    /// Remove a key; absent keys are not an error
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// List every key starting with `prefix` (unordered)
    async fn keys(&self, prefix: &str) -> AppResult<Vec<String>>;
}

/// Process-local backend, used by tests and the `memory` backend.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::internal("memory store lock poisoned"))
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(self
            .entries()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let kv = MemoryKv::new();
        kv.set("a_1", "one".to_string()).await.unwrap();
        kv.set("a_2", "two".to_string()).await.unwrap();
        kv.set("b_1", "three".to_string()).await.unwrap();

        assert_eq!(kv.get("a_1").await.unwrap().as_deref(), Some("one"));
        assert_eq!(kv.get("missing").await.unwrap(), None);

        let mut keys = kv.keys("a_").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a_1", "a_2"]);

        kv.delete("a_1").await.unwrap();
        kv.delete("a_1").await.unwrap();
        assert_eq!(kv.len(), 2);
    }
}
