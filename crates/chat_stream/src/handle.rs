//! Callback-style consumption of a [`TokenStream`].

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::TokenStream;
use crate::error::StreamError;
use crate::event::StreamEvent;

/// Receives the events of a spawned stream, in order.
pub trait StreamObserver: Send + 'static {
    fn on_token(&mut self, token: &str);
    fn on_error(&mut self, error: &StreamError);
    fn on_done(&mut self);
}

/// Handle to a stream driven on a background task.
///
/// Dropping the handle cancels the stream.
pub struct StreamHandle {
    cancel: CancellationToken,
    // Callbacks run while holding this lock; `cancel` flips it under the
    // same lock, so nothing is delivered once `cancel` returns.
    closed: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub(crate) fn spawn<O: StreamObserver>(
        mut events: TokenStream,
        cancel: CancellationToken,
        mut observer: O,
    ) -> Self {
        let closed = Arc::new(Mutex::new(false));
        let gate = Arc::clone(&closed);

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let stop = {
                    let closed = gate.lock().unwrap_or_else(PoisonError::into_inner);
                    if *closed {
                        true
                    } else {
                        match &event {
                            StreamEvent::Token(token) => observer.on_token(token),
                            StreamEvent::Error(error) => observer.on_error(error),
                            StreamEvent::Done => observer.on_done(),
                        }
                        false
                    }
                };
                if stop {
                    break;
                }
            }
        });

        Self {
            cancel,
            closed,
            task: Some(task),
        }
    }

    /// Close the connection. No callback runs after this returns.
    pub fn cancel(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        *closed = true;
        self.cancel.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait until the stream has delivered its terminal event.
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::error!("Stream task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
