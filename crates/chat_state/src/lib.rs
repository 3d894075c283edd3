//! chat_state - State machine for a chat session's send lifecycle
//!
//! Tracks whether a reply is being awaited or streamed, so a session can
//! refuse overlapping sends and always settle back into an idle state.

pub mod machine;

// Re-export commonly used types
pub use machine::{ChatEvent, SendState, StateMachine, StateTransition, TransitionError};
