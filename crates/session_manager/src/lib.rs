//! # Session Manager
//!
//! Owns the client side of a CalmBuddy conversation: the locally persisted
//! session identity, startup resolution of the active conversation, and the
//! [`SessionController`] that sends messages and folds streamed tokens into
//! the transcript.

pub mod controller;
pub mod error;
pub mod identity;
pub mod resolver;
pub mod storage;
pub mod structs;

// Re-exports
pub use controller::SessionController;
pub use error::{ControllerError, SessionError};
pub use identity::{IdentityProvider, ACTIVE_CHAT_KEY, SESSION_ID_KEY};
pub use resolver::{resolve_conversation, ResolvedConversation};
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
pub use structs::{ControllerSettings, SendOutcome, TranscriptEvent};
