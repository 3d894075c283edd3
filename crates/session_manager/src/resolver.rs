//! Startup conversation resolution for authenticated users.

use chat_backend::{ChatBackend, StoredMessage};
use chat_core::{ChatId, Credential};
use log::{debug, info};

use crate::error::ControllerError;
use crate::identity::IdentityProvider;
use crate::storage::SessionStorage;

#[derive(Debug, Clone)]
pub struct ResolvedConversation {
    pub chat_id: ChatId,
    pub history: Vec<StoredMessage>,
}

/// Pick the conversation to open at startup.
///
/// In order: the remembered chat if the server still has it, the newest
/// non-journal chat if it is still empty, otherwise a freshly created chat.
/// The choice is remembered for the next start.
pub async fn resolve_conversation<B, S>(
    backend: &B,
    identity: &IdentityProvider<S>,
    credential: &Credential,
    history_limit: usize,
) -> Result<ResolvedConversation, ControllerError>
where
    B: ChatBackend + ?Sized,
    S: SessionStorage,
{
    let chats = backend.list_chats(credential).await?;

    if let Some(cached) = identity.active_chat_id().await {
        if chats.iter().any(|c| c.chat_id == cached) {
            let history = backend
                .load_messages(credential, &cached, history_limit)
                .await?;
            info!("Resuming chat {} ({} messages)", cached, history.len());
            return Ok(ResolvedConversation {
                chat_id: cached,
                history,
            });
        }
        debug!("Remembered chat {} no longer exists", cached);
    }

    if let Some(newest) = chats.iter().find(|c| !c.is_journal) {
        let latest = backend.load_messages(credential, &newest.chat_id, 1).await?;
        if latest.is_empty() {
            info!("Reusing empty chat {}", newest.chat_id);
            identity.set_active_chat_id(Some(&newest.chat_id)).await;
            return Ok(ResolvedConversation {
                chat_id: newest.chat_id.clone(),
                history: Vec::new(),
            });
        }
    }

    let chat_id = backend.create_chat(credential, false).await?;
    info!("Created chat {}", chat_id);
    identity.set_active_chat_id(Some(&chat_id)).await;
    Ok(ResolvedConversation {
        chat_id,
        history: Vec::new(),
    })
}
