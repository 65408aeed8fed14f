//! Infrastructure layer - key-value storage backends.

mod file;
mod kv;
mod redis_store;

pub use file::FileKv;
pub use kv::{KeyValueStore, MemoryKv};
pub use redis_store::RedisKv;

#[cfg(any(test, feature = "test-utils"))]
pub use kv::MockKeyValueStore;
