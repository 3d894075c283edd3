//! Local session identity
//!
//! A guest conversation is keyed by a random identifier that is generated once
//! and then kept in [`SessionStorage`]. The provider never fails: if storage
//! is unavailable it still hands out a fresh identifier, it just cannot keep
//! it across calls.

use std::sync::Arc;

use chat_core::ChatId;
use log::{debug, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::storage::SessionStorage;

/// Storage key of the guest session identifier.
pub const SESSION_ID_KEY: &str = "session_id";
/// Storage key of the last active persistent conversation.
pub const ACTIVE_CHAT_KEY: &str = "active_chat_id";

pub struct IdentityProvider<S: SessionStorage> {
    storage: Arc<S>,
    cached: Mutex<Option<String>>,
}

impl<S: SessionStorage> IdentityProvider<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            cached: Mutex::new(None),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Return the persisted session identifier, creating it on first use.
    pub async fn get_or_create_session_id(&self) -> String {
        let mut cached = self.cached.lock().await;
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        match self.storage.get(SESSION_ID_KEY).await {
            Ok(Some(id)) if !id.trim().is_empty() => {
                let id = id.trim().to_string();
                *cached = Some(id.clone());
                return id;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Session storage unavailable, using a transient id: {}", e);
                return Uuid::new_v4().to_string();
            }
        }

        let id = Uuid::new_v4().to_string();
        match self.storage.set(SESSION_ID_KEY, &id).await {
            Ok(()) => {
                debug!("Created session id {}", id);
                *cached = Some(id.clone());
            }
            Err(e) => warn!("Could not persist session id: {}", e),
        }
        id
    }

    /// Last active persistent conversation, if one was remembered.
    pub async fn active_chat_id(&self) -> Option<ChatId> {
        match self.storage.get(ACTIVE_CHAT_KEY).await {
            Ok(value) => value.filter(|v| !v.is_empty()).map(ChatId::from),
            Err(e) => {
                warn!("Could not read active chat id: {}", e);
                None
            }
        }
    }

    /// Remember (or forget, with `None`) the active persistent conversation.
    pub async fn set_active_chat_id(&self, chat_id: Option<&ChatId>) {
        let result = match chat_id {
            Some(id) => self.storage.set(ACTIVE_CHAT_KEY, id.as_str()).await,
            None => self.storage.remove(ACTIVE_CHAT_KEY).await,
        };
        if let Err(e) = result {
            warn!("Could not persist active chat id: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SessionError};
    use crate::storage::{FileSessionStorage, MemorySessionStorage};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tempfile::tempdir;

    struct BrokenStorage;

    #[async_trait]
    impl SessionStorage for BrokenStorage {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(SessionError::StorageError("unavailable".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(SessionError::StorageError("unavailable".into()))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(SessionError::StorageError("unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_session_id_is_stable() {
        let identity = IdentityProvider::new(Arc::new(MemorySessionStorage::new()));

        let first = identity.get_or_create_session_id().await;
        let second = identity.get_or_create_session_id().await;
        assert_eq!(first, second);

        let parsed = Uuid::parse_str(&first).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_session_id_survives_restart() {
        let dir = tempdir().unwrap();
        let first = IdentityProvider::new(Arc::new(FileSessionStorage::new(dir.path())))
            .get_or_create_session_id()
            .await;

        let reopened = IdentityProvider::new(Arc::new(FileSessionStorage::new(dir.path())));
        assert_eq!(reopened.get_or_create_session_id().await, first);
    }

    #[tokio::test]
    async fn test_existing_session_id_is_reused() {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.set(SESSION_ID_KEY, "s-42").await.unwrap();

        let identity = IdentityProvider::new(storage);
        assert_eq!(identity.get_or_create_session_id().await, "s-42");
    }

    #[tokio::test]
    async fn test_broken_storage_still_yields_ids() {
        let identity = IdentityProvider::new(Arc::new(BrokenStorage));

        let ids: HashSet<String> = futures_util::future::join_all(
            (0..3).map(|_| identity.get_or_create_session_id()),
        )
        .await
        .into_iter()
        .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| Uuid::parse_str(id).is_ok()));
    }

    #[tokio::test]
    async fn test_active_chat_roundtrip() {
        let identity = IdentityProvider::new(Arc::new(MemorySessionStorage::new()));
        assert_eq!(identity.active_chat_id().await, None);

        identity.set_active_chat_id(Some(&ChatId::from("12"))).await;
        assert_eq!(identity.active_chat_id().await, Some(ChatId::from("12")));

        identity.set_active_chat_id(None).await;
        assert_eq!(identity.active_chat_id().await, None);
    }

    #[tokio::test]
    async fn test_active_chat_with_broken_storage() {
        let identity = IdentityProvider::new(Arc::new(BrokenStorage));
        identity.set_active_chat_id(Some(&ChatId::from("1"))).await;
        assert_eq!(identity.active_chat_id().await, None);
    }
}
