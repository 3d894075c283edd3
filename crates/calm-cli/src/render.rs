use std::io::{self, Write};

use chat_core::{Message, Role};
use colored::Colorize;
use session_manager::TranscriptEvent;

const ERROR_MARKER: &str = "[error:";

/// Prints transcript events as they arrive.
///
/// Tokens are written as-is; whatever a finalized reply holds beyond the
/// printed tokens (a non-streamed answer, an error marker) is written when
/// the reply is finalized. After the receiver lags the partial line can no
/// longer be trusted, so the finalized reply is printed again in full.
#[derive(Default)]
pub struct Renderer {
    reply_id: Option<String>,
    printed: usize,
    resync: bool,
}

impl Renderer {
    /// Events were dropped; stop streaming tokens for the current reply.
    pub fn lagged(&mut self) {
        if self.reply_id.is_some() && !self.resync {
            self.resync = true;
            self.printed = 0;
            println!();
            println!("{}", "(catching up…)".dimmed());
        }
    }

    /// Print a reply whose finalize event was lost.
    pub fn finish_pending(&mut self, messages: &[Message]) {
        let Some(id) = self.reply_id.take() else {
            return;
        };
        if let Some(message) = messages.iter().find(|m| m.id == id && !m.in_flight) {
            if self.resync || self.printed == 0 {
                println!();
                print_message(message);
            } else {
                println!("{}", message.content.get(self.printed..).unwrap_or_default());
            }
        } else {
            println!();
        }
        self.printed = 0;
        self.resync = false;
    }

    pub fn render(&mut self, event: &TranscriptEvent) {
        match event {
            TranscriptEvent::MessageAppended(message) if message.in_flight => {
                self.reply_id = Some(message.id.clone());
                self.printed = 0;
                self.resync = false;
                print!("{} ", "CalmBuddy:".green().bold());
                flush();
            }
            TranscriptEvent::MessageAppended(_) => {}
            TranscriptEvent::TokenAppended { id, token } => {
                if !self.resync && self.reply_id.as_deref() == Some(id.as_str()) {
                    print!("{}", token);
                    self.printed += token.len();
                    flush();
                }
            }
            TranscriptEvent::MessageFinalized(message) => {
                if self.reply_id.as_deref() != Some(message.id.as_str()) {
                    return;
                }
                if self.resync {
                    print_message(message);
                    self.reply_id = None;
                    self.resync = false;
                    return;
                }
                let rest = message.content.get(self.printed..).unwrap_or_default();
                if rest.contains(ERROR_MARKER) {
                    print!("{}", rest.red());
                } else {
                    print!("{}", rest);
                }
                println!();
                self.reply_id = None;
                self.printed = 0;
            }
            TranscriptEvent::TranscriptReplaced(messages) => {
                self.reply_id = None;
                self.printed = 0;
                self.resync = false;
                print_transcript(messages);
            }
        }
    }
}

pub fn print_transcript(messages: &[Message]) {
    println!("{}", "─".repeat(50).dimmed());
    for message in messages {
        print_message(message);
    }
    println!("{}", "─".repeat(50).dimmed());
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("{} {}", "You:".cyan().bold(), message.content),
        Role::Assistant if message.content.contains(ERROR_MARKER) => {
            println!("{} {}", "CalmBuddy:".green().bold(), message.content.red())
        }
        Role::Assistant => println!("{} {}", "CalmBuddy:".green().bold(), message.content),
    }
}

fn flush() {
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(content: &str) -> Message {
        let mut message = Message::assistant(content);
        message.id = "r-1".into();
        message
    }

    fn start(renderer: &mut Renderer) {
        let mut pending = reply("");
        pending.in_flight = true;
        renderer.render(&TranscriptEvent::MessageAppended(pending));
        renderer.render(&TranscriptEvent::TokenAppended {
            id: "r-1".into(),
            token: "Hel".into(),
        });
    }

    #[test]
    fn tokens_are_counted_until_finalized() {
        let mut renderer = Renderer::default();
        start(&mut renderer);
        assert_eq!(renderer.printed, 3);

        renderer.render(&TranscriptEvent::MessageFinalized(reply("Hello")));
        assert!(renderer.reply_id.is_none());
        assert_eq!(renderer.printed, 0);
    }

    #[test]
    fn lag_mid_reply_ignores_tokens_until_finalized() {
        let mut renderer = Renderer::default();
        start(&mut renderer);

        renderer.lagged();
        assert!(renderer.resync);
        assert_eq!(renderer.printed, 0);

        renderer.render(&TranscriptEvent::TokenAppended {
            id: "r-1".into(),
            token: "lo".into(),
        });
        assert_eq!(renderer.printed, 0);

        renderer.render(&TranscriptEvent::MessageFinalized(reply("Hello")));
        assert!(!renderer.resync);
        assert!(renderer.reply_id.is_none());
    }

    #[test]
    fn lag_between_replies_changes_nothing() {
        let mut renderer = Renderer::default();
        renderer.lagged();
        assert!(!renderer.resync);
    }

    #[test]
    fn lost_finalize_is_recovered_from_the_transcript() {
        let mut renderer = Renderer::default();
        start(&mut renderer);
        renderer.lagged();

        renderer.finish_pending(&[reply("Hello")]);
        assert!(renderer.reply_id.is_none());
        assert!(!renderer.resync);

        // Nothing pending: a no-op
        renderer.finish_pending(&[reply("Hello")]);
        assert!(renderer.reply_id.is_none());
    }
}
