//! File-backed key-value store: one JSON file per key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use common::{AppError, AppResult};

use super::KeyValueStore;

const FILE_EXTENSION: &str = "json";

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    /// Open (and create if needed) a data directory.
    pub async fn open(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "File store opened");
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AppError::validation(format!("invalid storage key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.{}", key, FILE_EXTENSION)))
    }
}

#[async_trait]
impl KeyValueStore for FileKv {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        let path = self.path_for(key)?;
        // Write then rename so readers never see a half-written blob
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with(prefix) {
                    keys.push(stem.to_string());
                }
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("user-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = scratch_dir();
        let kv = FileKv::open(&dir).await.unwrap();

        kv.set("users_db", "{}".to_string()).await.unwrap();
        kv.set("users_backup_1", "[]".to_string()).await.unwrap();

        assert_eq!(kv.get("users_db").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(kv.get("absent").await.unwrap(), None);
        assert_eq!(kv.keys("users_backup_").await.unwrap(), vec!["users_backup_1"]);

        kv.delete("users_backup_1").await.unwrap();
        kv.delete("users_backup_1").await.unwrap();
        assert!(kv.keys("users_backup_").await.unwrap().is_empty());

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = scratch_dir();
        let kv = FileKv::open(&dir).await.unwrap();

        let err = kv.set("../escape", "x".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        fs::remove_dir_all(&dir).await.unwrap();
    }
}
