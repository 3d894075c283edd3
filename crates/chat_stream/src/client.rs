use std::fmt;
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::event::{parse_frame, Frame, StreamEvent};
use crate::handle::{StreamHandle, StreamObserver};

/// Ordered events of one streamed reply.
///
/// Ends after the first `Done` or `Error`, or as soon as the paired
/// cancellation token fires.
pub type TokenStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One streaming request: endpoint, query parameters and optional bearer.
#[derive(Clone)]
pub struct StreamRequest {
    endpoint: String,
    params: Vec<(String, String)>,
    bearer: Option<String>,
}

impl StreamRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            bearer: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Send `Authorization: Bearer <token>` with the request.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn has_bearer(&self) -> bool {
        self.bearer.is_some()
    }
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("endpoint", &self.endpoint)
            .field("params", &self.params)
            .field("bearer", &self.bearer.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamClient {
    http: Client,
}

impl StreamClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Open the stream lazily: the request is sent on first poll.
    ///
    /// Transport failures (send error, non-success status, broken body)
    /// surface as exactly one `StreamEvent::Error`.
    pub fn open(&self, request: StreamRequest, cancel: CancellationToken) -> TokenStream {
        let http = self.http.clone();

        Box::pin(async_stream::stream! {
            let mut builder = http
                .get(&request.endpoint)
                .query(&request.params)
                .header(ACCEPT, "text/event-stream")
                .header(CACHE_CONTROL, "no-cache");
            if let Some(token) = &request.bearer {
                builder = builder.bearer_auth(token);
            }

            debug!("Opening stream {}", request.endpoint);
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = builder.send() => Some(result),
            };

            match sent {
                None => debug!("Stream cancelled before the response arrived"),
                Some(Err(e)) => {
                    warn!("Failed to open stream: {}", e);
                    yield StreamEvent::Error(StreamError::Http(e));
                }
                Some(Ok(response)) if !response.status().is_success() => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    warn!("Stream request rejected with status {}", status);
                    yield StreamEvent::Error(StreamError::Status { status, body });
                }
                Some(Ok(response)) => {
                    let mut frames = decode_frames(response.bytes_stream(), cancel);
                    while let Some(event) = frames.next().await {
                        yield event;
                    }
                }
            }
        })
    }

    /// Drive a stream on a task, reporting through `observer`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<O: StreamObserver>(&self, request: StreamRequest, observer: O) -> StreamHandle {
        let cancel = CancellationToken::new();
        let events = self.open(request, cancel.clone());
        StreamHandle::spawn(events, cancel, observer)
    }
}

/// Decode a raw event-stream body into [`StreamEvent`]s.
///
/// Frames split across chunks are buffered until their terminating blank
/// line arrives, and multi-byte characters split across chunks are decoded
/// intact. Malformed payloads are skipped.
pub fn decode_frames<S, B, E>(body: S, cancel: CancellationToken) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let events = body.eventsource();
        futures_util::pin_mut!(events);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Stream cancelled");
                    break;
                }
                next = events.next() => next,
            };

            match next {
                None => {
                    yield StreamEvent::Error(StreamError::Closed);
                    break;
                }
                Some(Err(e)) => {
                    warn!("Error in event stream: {}", e);
                    yield StreamEvent::Error(StreamError::Transport(e.to_string()));
                    break;
                }
                Some(Ok(event)) => match parse_frame(&event.data) {
                    Frame::Token(token) => {
                        yield StreamEvent::Token(token);
                    }
                    Frame::Done => {
                        debug!("Received [DONE] signal, closing stream.");
                        yield StreamEvent::Done;
                        break;
                    }
                    Frame::Error(message) => {
                        yield StreamEvent::Error(StreamError::Server(message));
                        break;
                    }
                    Frame::Skip => {}
                },
            }
        }
    })
}
