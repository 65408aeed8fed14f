//! User Service Library
//!
//! An indexed, persisted user record store:
//!
//! - **store**: primary table, secondary indexes, search, stats,
//!   import/export, session cache and scheduled backups
//! - **infra**: key-value backends (memory, file, redis)
//! - **config**: environment-driven settings
//! - **cli** / **commands**: the `user-service` binary

pub mod cli;
pub mod commands;
pub mod config;
pub mod infra;
pub mod store;

use std::sync::Arc;

use common::AppResult;

use crate::config::{StoreBackend, UserServiceConfig};
use crate::infra::{FileKv, KeyValueStore, MemoryKv, RedisKv};
use crate::store::UserStore;

/// Connect the configured backend.
pub async fn connect_backend(config: &UserServiceConfig) -> AppResult<Arc<dyn KeyValueStore>> {
    let kv: Arc<dyn KeyValueStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryKv::new()),
        StoreBackend::File => Arc::new(FileKv::open(&config.data_dir).await?),
        StoreBackend::Redis => Arc::new(RedisKv::connect(&config.cache).await?),
    };
    Ok(kv)
}

/// Connect the backend and open the store on it.
pub async fn open_store(config: &UserServiceConfig) -> AppResult<Arc<UserStore>> {
    let kv = connect_backend(config).await?;
    Ok(Arc::new(UserStore::open(kv, config.store.clone()).await))
}
