use chat_core::{ChatId, Message, Role};
use serde::{Deserialize, Serialize};

/// One entry of `GET /chats`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    #[serde(default)]
    pub is_journal: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateChatRequest {
    pub is_journal: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateChatResponse {
    pub chat_id: ChatId,
}

/// A message as kept by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl StoredMessage {
    /// Convert into a finalized transcript entry, mapping the stored role.
    pub fn into_message(self) -> Message {
        let message = match Role::from_stored(&self.role) {
            Role::User => Message::user(self.content),
            Role::Assistant => Message::assistant(self.content),
        };
        match self.id {
            Some(serde_json::Value::String(id)) => message.with_id(id),
            Some(serde_json::Value::Number(id)) => message.with_id(id.to_string()),
            _ => message,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionRequest<'a> {
    pub session_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub session_id: &'a str,
    pub message: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_messages_map_roles_and_ids() {
        let human: StoredMessage =
            serde_json::from_str(r#"{"id": 3, "role": "human", "content": "hi"}"#).unwrap();
        let ai: StoredMessage =
            serde_json::from_str(r#"{"id": "m-4", "role": "ai", "content": "hello"}"#).unwrap();

        let human = human.into_message();
        assert_eq!(human.role, Role::User);
        assert_eq!(human.content, "hi");
        assert_eq!(human.id, "3");
        assert!(!human.in_flight);

        let ai = ai.into_message();
        assert_eq!(ai.role, Role::Assistant);
        assert_eq!(ai.id, "m-4");
    }

    #[test]
    fn chat_summary_defaults_journal_flag() {
        let summary: ChatSummary = serde_json::from_str(r#"{"chat_id": 12}"#).unwrap();
        assert_eq!(summary.chat_id, ChatId::from("12"));
        assert!(!summary.is_journal);
    }
}
