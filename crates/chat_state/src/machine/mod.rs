//! State machine module
//!
//! Contains the FSM implementation for the send lifecycle.

mod events;
mod states;
mod transitions;

pub use events::ChatEvent;
pub use states::SendState;
pub use transitions::{StateMachine, StateTransition, TransitionError};
