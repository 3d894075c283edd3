//! chat_stream - token streaming over server-sent events
//!
//! The chatbot streams its answer as `data: {"token": ...}` frames and ends
//! with `data: [DONE]`. This crate turns that body into a [`TokenStream`] of
//! typed [`StreamEvent`]s, with cancellation passed in as a
//! [`CancellationToken`].
//!
//! Callers that prefer callbacks can use [`StreamClient::spawn`], which drives
//! the stream on a task and hands back a [`StreamHandle`].

pub mod client;
pub mod error;
pub mod event;
pub mod handle;

pub use client::{decode_frames, StreamClient, StreamRequest, TokenStream};
pub use error::StreamError;
pub use event::{parse_frame, Frame, StreamEvent};
pub use handle::{StreamHandle, StreamObserver};
pub use tokio_util::sync::CancellationToken;
