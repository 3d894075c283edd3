//! chat_core - Core types for the CalmBuddy chat client
//!
//! This crate provides the foundational types used across the chat crates:
//! - `message` - Message, Role and the identifiers the backend hands out
//! - `transcript` - the ordered, in-memory conversation shown to the user
//! - `mode` - guest vs. persistent conversation scoping
//! - `config` / `paths` - configuration loading and on-disk locations

pub mod config;
pub mod message;
pub mod mode;
pub mod paths;
pub mod transcript;

// Re-export commonly used types
pub use config::Config;
pub use message::{ChatId, Message, Role};
pub use mode::{Credential, Mode};
pub use transcript::{Transcript, DEFAULT_GREETING};
