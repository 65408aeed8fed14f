//! Cached "current user" for fast reattachment after restart.
//!
//! Independent of the primary table: clearing the session never deletes the
//! underlying record, and deleting the record does not clear the session.

use std::sync::Arc;

use tokio::sync::Mutex;

use domain::{UserView, KEY_CURRENT_SESSION};

use crate::infra::KeyValueStore;

pub struct SessionCache {
    kv: Arc<dyn KeyValueStore>,
    current: Mutex<Option<UserView>>,
}

impl SessionCache {
    /// Restore any persisted session. Failures leave the cache empty.
    pub async fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let current = match kv.get(KEY_CURRENT_SESSION).await {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .map_err(|e| tracing::warn!(error = %e, "Discarding malformed session"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session");
                None
            }
        };

        Self {
            kv,
            current: Mutex::new(current),
        }
    }

    pub async fn get(&self) -> Option<UserView> {
        self.current.lock().await.clone()
    }

    pub async fn save(&self, user: UserView) {
        let mut current = self.current.lock().await;
        match serde_json::to_string(&user) {
            Ok(json) => {
                if let Err(e) = self.kv.set(KEY_CURRENT_SESSION, json).await {
                    tracing::error!(user_id = %user.id, error = %e, "Failed to persist session");
                }
            }
            Err(e) => tracing::error!(user_id = %user.id, error = %e, "Failed to encode session"),
        }
        *current = Some(user);
    }

    pub async fn clear(&self) {
        let mut current = self.current.lock().await;
        if let Err(e) = self.kv.delete(KEY_CURRENT_SESSION).await {
            tracing::error!(error = %e, "Failed to remove persisted session");
        }
        *current = None;
    }
}
