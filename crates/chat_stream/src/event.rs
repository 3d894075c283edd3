use serde::Deserialize;

use crate::error::StreamError;

/// Sentinel payload ending a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a consumer sees from a token stream.
#[derive(Debug)]
pub enum StreamEvent {
    Token(String),
    Error(StreamError),
    Done,
}

/// Interpretation of one frame's `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Token(String),
    Error(String),
    Done,
    /// Malformed, empty or unknown payloads.
    Skip,
}

#[derive(Deserialize)]
struct Payload {
    token: Option<String>,
    error: Option<String>,
}

pub fn parse_frame(data: &str) -> Frame {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<Payload>(data) {
        Ok(Payload {
            error: Some(error), ..
        }) => Frame::Error(error),
        Ok(Payload {
            token: Some(token), ..
        }) if !token.is_empty() => Frame::Token(token),
        Ok(_) => Frame::Skip,
        Err(e) => {
            log::debug!("Skipping malformed stream frame ({}): {:?}", e, data);
            Frame::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_ends_stream() {
        assert_eq!(parse_frame("[DONE]"), Frame::Done);
        assert_eq!(parse_frame(" [DONE] "), Frame::Done);
    }

    #[test]
    fn token_payloads_are_emitted() {
        assert_eq!(
            parse_frame(r#"{"token":"I "}"#),
            Frame::Token("I ".to_string())
        );
    }

    #[test]
    fn whitespace_tokens_are_kept_verbatim() {
        assert_eq!(parse_frame(r#"{"token":" "}"#), Frame::Token(" ".to_string()));
    }

    #[test]
    fn error_wins_over_token() {
        assert_eq!(
            parse_frame(r#"{"token":"x","error":"Streaming error: boom"}"#),
            Frame::Error("Streaming error: boom".to_string())
        );
    }

    #[test]
    fn empty_and_unknown_payloads_are_skipped() {
        assert_eq!(parse_frame(r#"{"token":""}"#), Frame::Skip);
        assert_eq!(parse_frame(r#"{"other":1}"#), Frame::Skip);
        assert_eq!(parse_frame("not-json"), Frame::Skip);
        assert_eq!(parse_frame(""), Frame::Skip);
    }
}
