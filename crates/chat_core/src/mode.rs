//! Conversation scoping.

use std::fmt;

use crate::message::ChatId;

/// Bearer credential for persistent conversations.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns `None` for blank tokens.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        (!token.is_empty()).then(|| Self(token.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Which conversation a request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Ephemeral conversation keyed by the local session identity.
    Guest { session_id: String },
    /// Server-side conversation; requires a credential.
    Persistent {
        chat_id: ChatId,
        credential: Credential,
    },
}

impl Mode {
    pub fn is_guest(&self) -> bool {
        matches!(self, Mode::Guest { .. })
    }

    /// The query parameter that scopes a stream request to this conversation.
    pub fn scope_param(&self) -> (&'static str, &str) {
        match self {
            Mode::Guest { session_id } => ("session_id", session_id),
            Mode::Persistent { chat_id, .. } => ("chat_id", chat_id.as_str()),
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Mode::Guest { .. } => None,
            Mode::Persistent { credential, .. } => Some(credential),
        }
    }
}
