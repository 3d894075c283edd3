//! Transcript - the ordered conversation shown to the user
//!
//! Insertion order is display order. At most one entry is in flight at a
//! time; only that entry is ever mutated in place.

use crate::message::{Message, Role};

pub const DEFAULT_GREETING: &str =
    "Hi, I'm CalmBuddy. I'm here to listen. How are you feeling right now?";

#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    greeting: String,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}

impl Transcript {
    /// A transcript holding only the greeting.
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        Self {
            messages: vec![Message::assistant(greeting.clone())],
            greeting,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn in_flight(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.in_flight)
    }

    /// Append a finalized user entry.
    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::user(content))
    }

    /// Append an in-flight assistant placeholder.
    ///
    /// Returns `None` if another entry is already in flight.
    pub fn begin_reply(&mut self) -> Option<&Message> {
        if self.in_flight().is_some() {
            return None;
        }
        Some(self.push(Message::placeholder()))
    }

    /// Append `token` to the in-flight entry `id`.
    ///
    /// Returns false when `id` is not the in-flight entry (finalized or gone).
    pub fn append_token(&mut self, id: &str, token: &str) -> bool {
        match self.in_flight_mut(id) {
            Some(msg) => {
                msg.content.push_str(token);
                true
            }
            None => false,
        }
    }

    /// Replace the whole content of the in-flight entry `id`.
    pub fn set_content(&mut self, id: &str, content: impl Into<String>) -> bool {
        match self.in_flight_mut(id) {
            Some(msg) => {
                msg.content = content.into();
                true
            }
            None => false,
        }
    }

    /// Clear the in-flight flag on `id`.
    pub fn finalize(&mut self, id: &str) -> Option<&Message> {
        let msg = self.in_flight_mut(id)?;
        msg.in_flight = false;
        Some(msg)
    }

    /// Finalize `id` with a visible error marker appended to its content.
    pub fn fail(&mut self, id: &str, reason: &str) -> Option<&Message> {
        let msg = self.in_flight_mut(id)?;
        if !msg.content.is_empty() {
            msg.content.push_str("\n\n");
        }
        msg.content.push_str(&format!("[error: {reason}]"));
        msg.in_flight = false;
        Some(msg)
    }

    /// Replace the transcript wholesale.
    ///
    /// An empty history falls back to the greeting. Loaded entries are never
    /// in flight.
    pub fn replace(&mut self, messages: Vec<Message>) {
        if messages.is_empty() {
            self.reset();
            return;
        }
        self.messages = messages
            .into_iter()
            .map(|mut m| {
                m.in_flight = false;
                m
            })
            .collect();
    }

    /// Back to a single greeting entry.
    pub fn reset(&mut self) {
        self.messages = vec![Message::assistant(self.greeting.clone())];
    }

    /// Entries as `(role, content)` pairs, handy for assertions and rendering.
    pub fn turns(&self) -> Vec<(Role, &str)> {
        self.messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect()
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    fn in_flight_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.in_flight && m.id == id)
    }
}
