//! Chat events - Defines events that trigger state transitions

use serde::{Deserialize, Serialize};

/// Defines the events that can trigger state transitions in the FSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEvent {
    // ========== User Events ==========
    /// User sent a new message.
    UserMessageSent,

    /// User cancelled the reply in progress.
    UserCancelled,

    /// The conversation was reset, switched or deleted.
    ConversationReset,

    // ========== Stream Events ==========
    /// A token arrived for the in-flight reply.
    TokenReceived,

    /// The stream delivered its terminal `[DONE]`.
    StreamEnded,

    /// The stream failed (transport or server-reported error).
    StreamFailed { error: String },
}
