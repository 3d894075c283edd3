//! State transitions - FSM transition logic
//!
//! Implements the state machine that handles event-driven state transitions.

use thiserror::Error;

use super::events::ChatEvent;
use super::states::SendState;

/// Error type for rejected state transitions.
#[derive(Error, Debug, Clone)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} with event {event:?}")]
    InvalidTransition { from: SendState, event: ChatEvent },
}

/// Represents a state transition result.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// The state before the transition.
    pub from: SendState,
    /// The state after the transition.
    pub to: SendState,
    /// The event that triggered the transition.
    pub event: ChatEvent,
    /// Whether the state actually changed.
    pub changed: bool,
}

/// State machine for managing send state transitions.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current_state: SendState,
}

impl StateMachine {
    /// Create a new state machine in Idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    pub fn state(&self) -> &SendState {
        &self.current_state
    }

    /// Handle an event and transition to a new state.
    ///
    /// Events that do not apply in the current state leave it unchanged.
    pub fn handle_event(&mut self, event: ChatEvent) -> StateTransition {
        let old_state = self.current_state.clone();
        let new_state = self.compute_next_state(&old_state, &event);
        let changed = old_state != new_state;

        if !changed {
            log::trace!("Event {:?} ignored in state {:?}", event, old_state);
        }
        self.current_state = new_state.clone();

        StateTransition {
            from: old_state,
            to: new_state,
            event,
            changed,
        }
    }

    /// Like [`handle_event`](Self::handle_event), but reject events that
    /// would not change the state.
    pub fn try_handle_event(
        &mut self,
        event: ChatEvent,
    ) -> Result<StateTransition, TransitionError> {
        if !self.can_transition(&event) {
            return Err(TransitionError::InvalidTransition {
                from: self.current_state.clone(),
                event,
            });
        }
        Ok(self.handle_event(event))
    }

    /// Compute the next state given current state and event.
    fn compute_next_state(&self, state: &SendState, event: &ChatEvent) -> SendState {
        use ChatEvent::*;
        use SendState::*;

        match (state, event) {
            // ========== Idle Transitions ==========
            (Idle | Failed { .. }, UserMessageSent) => AwaitingResponse,

            // ========== Streaming ==========
            (AwaitingResponse | StreamingResponse, TokenReceived) => StreamingResponse,
            (AwaitingResponse | StreamingResponse, StreamEnded) => Idle,
            (AwaitingResponse | StreamingResponse, StreamFailed { error }) => Failed {
                error_message: error.clone(),
                failed_at: chrono::Utc::now().to_rfc3339(),
            },

            // ========== User Actions ==========
            (AwaitingResponse | StreamingResponse, UserCancelled) => Idle,
            (_, ConversationReset) => Idle,

            // ========== Default: No transition ==========
            _ => state.clone(),
        }
    }

    /// Check if a transition is valid without executing it.
    pub fn can_transition(&self, event: &ChatEvent) -> bool {
        let next = self.compute_next_state(&self.current_state, event);
        next != self.current_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_flow() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state(), &SendState::Idle);

        let t1 = sm.handle_event(ChatEvent::UserMessageSent);
        assert!(t1.changed);
        assert_eq!(sm.state(), &SendState::AwaitingResponse);

        let t2 = sm.handle_event(ChatEvent::TokenReceived);
        assert!(t2.changed);
        assert_eq!(sm.state(), &SendState::StreamingResponse);

        let t3 = sm.handle_event(ChatEvent::TokenReceived);
        assert!(!t3.changed);

        sm.handle_event(ChatEvent::StreamEnded);
        assert_eq!(sm.state(), &SendState::Idle);
    }

    #[test]
    fn test_second_send_is_rejected_while_busy() {
        let mut sm = StateMachine::new();
        sm.try_handle_event(ChatEvent::UserMessageSent).unwrap();

        let err = sm.try_handle_event(ChatEvent::UserMessageSent).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                from: SendState::AwaitingResponse,
                ..
            }
        ));
    }

    #[test]
    fn test_failure_accepts_new_message() {
        let mut sm = StateMachine::new();
        sm.handle_event(ChatEvent::UserMessageSent);
        sm.handle_event(ChatEvent::StreamFailed {
            error: "connection reset".into(),
        });
        assert!(matches!(
            sm.state(),
            SendState::Failed { error_message, .. } if error_message == "connection reset"
        ));

        sm.try_handle_event(ChatEvent::UserMessageSent).unwrap();
        assert!(sm.state().is_busy());
    }

    #[test]
    fn test_cancel_and_reset_return_to_idle() {
        let mut sm = StateMachine::new();
        sm.handle_event(ChatEvent::UserMessageSent);
        sm.handle_event(ChatEvent::UserCancelled);
        assert_eq!(sm.state(), &SendState::Idle);

        sm.handle_event(ChatEvent::UserMessageSent);
        sm.handle_event(ChatEvent::TokenReceived);
        sm.handle_event(ChatEvent::ConversationReset);
        assert_eq!(sm.state(), &SendState::Idle);
    }

    #[test]
    fn test_stream_events_ignored_when_idle() {
        let mut sm = StateMachine::new();
        assert!(!sm.handle_event(ChatEvent::TokenReceived).changed);
        assert!(!sm.handle_event(ChatEvent::StreamEnded).changed);
        assert_eq!(sm.state(), &SendState::Idle);
    }
}
