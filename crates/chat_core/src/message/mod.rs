//! Message module - transcript entries and backend identifiers
//!
//! Shared message types used across the system.

mod types;

pub use types::{ChatId, Message, Role};
