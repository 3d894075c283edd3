//! Session storage trait and implementations

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Small key/value store for locally persisted session state
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Read a value, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SessionError::Validation(format!("invalid key: {key:?}")))
    }
}

/// File-based session storage, one file per key
#[derive(Clone, Debug)]
pub struct FileSessionStorage {
    base_path: PathBuf,
}

impl FileSessionStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        fs::create_dir_all(&self.base_path).await?;
        fs::write(&path, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory session storage; nothing survives the process
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_storage_set_and_get() {
        let dir = tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path().join("session"));

        storage.set("session_id", "abc").await.unwrap();

        let loaded = storage.get("session_id").await.unwrap();
        assert_eq!(loaded.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_file_storage_missing_key() {
        let dir = tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path());

        assert_eq!(storage.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_storage_remove() {
        let dir = tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path());

        storage.set("active_chat_id", "7").await.unwrap();
        storage.remove("active_chat_id").await.unwrap();
        assert_eq!(storage.get("active_chat_id").await.unwrap(), None);

        // Removing twice is fine
        storage.remove("active_chat_id").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_persists_across_instances() {
        let dir = tempdir().unwrap();
        FileSessionStorage::new(dir.path())
            .set("session_id", "kept")
            .await
            .unwrap();

        let reopened = FileSessionStorage::new(dir.path());
        assert_eq!(
            reopened.get("session_id").await.unwrap().as_deref(),
            Some("kept")
        );
    }

    #[tokio::test]
    async fn test_file_storage_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path());

        let result = storage.set("../escape", "x").await;
        assert!(matches!(result, Err(SessionError::Validation(_))));
    }

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemorySessionStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);

        storage.set("k", "v").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));

        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);
    }
}
