use chat_core::{Config, Message, DEFAULT_GREETING};

/// Controller knobs taken from [`Config`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Content of the assistant entry shown in an empty transcript.
    pub greeting: String,
    /// How many stored messages to load when opening a conversation.
    pub history_limit: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            history_limit: 100,
        }
    }
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            greeting: config.greeting().to_string(),
            history_limit: config.history_limit,
        }
    }
}

/// Transcript changes broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    MessageAppended(Message),
    TokenAppended { id: String, token: String },
    MessageFinalized(Message),
    /// The whole transcript was swapped (new, switch, delete, reset).
    TranscriptReplaced(Vec<Message>),
}

/// How a send ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply streamed to completion.
    Completed,
    /// Nothing was sent: empty input or a reply already in flight.
    Skipped,
    /// The reply was abandoned by cancel, shutdown or a lifecycle operation.
    Cancelled,
}
