//! Redis-backed key-value store.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use common::{AppResult, CacheConfig};

use super::KeyValueStore;

/// Redis wrapper with a managed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisKv {
    connection: ConnectionManager,
}

impl RedisKv {
    /// Connect to Redis, returning an error instead of panicking.
    pub async fn connect(config: &CacheConfig) -> AppResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let connection = ConnectionManager::new(client).await?;

        tracing::info!("Redis store connected");

        Ok(Self { connection })
    }
}

#[async_trait]
impl KeyValueStore for RedisKv {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(format!("{}*", prefix)).await?;
        Ok(keys)
    }
}
