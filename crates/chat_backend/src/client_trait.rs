use async_trait::async_trait;
use chat_core::{ChatId, Credential};

use crate::error::Result;
use crate::models::{ChatSummary, StoredMessage};

/// Conversation and chatbot endpoints the session controller relies on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Conversations of the authenticated user, newest first.
    async fn list_chats(&self, credential: &Credential) -> Result<Vec<ChatSummary>>;

    async fn create_chat(&self, credential: &Credential, is_journal: bool) -> Result<ChatId>;

    async fn load_messages(
        &self,
        credential: &Credential,
        chat_id: &ChatId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>>;

    async fn delete_chat(&self, credential: &Credential, chat_id: &ChatId) -> Result<()>;

    /// Drop the server-side history of a guest session.
    async fn reset_session(&self, session_id: &str) -> Result<()>;

    /// Non-streaming reply for a guest session.
    async fn chat(&self, session_id: &str, message: &str) -> Result<String>;

    /// URL of the token stream endpoint.
    fn stream_endpoint(&self) -> String;
}
