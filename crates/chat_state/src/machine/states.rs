//! Send states - Defines all possible states of a session's send lifecycle

use serde::{Deserialize, Serialize};

/// Defines the possible states of a session's send lifecycle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    /// Awaiting user input.
    #[default]
    Idle,

    /// Message sent, waiting for the first token.
    AwaitingResponse,

    /// Tokens are arriving for the in-flight reply.
    StreamingResponse,

    /// The last reply failed. Accepts new input like `Idle`.
    Failed {
        error_message: String,
        failed_at: String, // ISO timestamp
    },
}

impl SendState {
    /// Check if a reply is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::AwaitingResponse | Self::StreamingResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(SendState::default(), SendState::Idle);
    }

    #[test]
    fn test_busy_state_detection() {
        assert!(SendState::AwaitingResponse.is_busy());
        assert!(SendState::StreamingResponse.is_busy());
        assert!(!SendState::Idle.is_busy());

        let failed = SendState::Failed {
            error_message: "x".into(),
            failed_at: String::new(),
        };
        assert!(!failed.is_busy());
    }
}
