//! Session controller
//!
//! Sends user messages, folds the streamed reply into the transcript and
//! runs the conversation lifecycle (new, switch, delete, reset). State lives
//! behind a single `RwLock`; stream events are applied under the write lock
//! and only while the send that produced them is still the active one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_backend::{ChatBackend, ChatSummary, StoredMessage};
use chat_core::{ChatId, Credential, Message, Mode, Transcript};
use chat_state::{ChatEvent, SendState, StateMachine};
use chat_stream::{CancellationToken, StreamClient, StreamEvent, StreamRequest};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{broadcast, RwLock};

use crate::error::ControllerError;
use crate::identity::IdentityProvider;
use crate::resolver::resolve_conversation;
use crate::storage::SessionStorage;
use crate::structs::{ControllerSettings, SendOutcome, TranscriptEvent};

type Result<T> = std::result::Result<T, ControllerError>;

const EVENT_CAPACITY: usize = 256;

struct ActiveSend {
    id: u64,
    reply_id: String,
    cancel: CancellationToken,
}

struct ControllerState {
    session_id: String,
    credential: Option<Credential>,
    active_chat: Option<ChatId>,
    transcript: Transcript,
    machine: StateMachine,
    active: Option<ActiveSend>,
}

impl ControllerState {
    /// `None` when signed in but no conversation is open.
    fn mode(&self) -> Option<Mode> {
        match (&self.credential, &self.active_chat) {
            (None, _) => Some(Mode::Guest {
                session_id: self.session_id.clone(),
            }),
            (Some(credential), Some(chat_id)) => Some(Mode::Persistent {
                chat_id: chat_id.clone(),
                credential: credential.clone(),
            }),
            (Some(_), None) => None,
        }
    }

    fn owns(&self, send_id: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == send_id)
    }

    /// Stop the active send, keeping whatever content arrived so far.
    fn abort_active(&mut self) -> Option<Message> {
        let active = self.active.take()?;
        active.cancel.cancel();
        self.machine.handle_event(ChatEvent::UserCancelled);
        self.transcript.finalize(&active.reply_id).cloned()
    }

    /// Abort `send_id` if it is still the active send.
    fn release(&mut self, send_id: u64, events: &broadcast::Sender<TranscriptEvent>) {
        if !self.owns(send_id) {
            return;
        }
        if let Some(msg) = self.abort_active() {
            let _ = events.send(TranscriptEvent::MessageFinalized(msg));
        }
    }
}

/// Releases a send whose future is dropped before it settles, so the
/// controller never stays busy on behalf of a caller that went away.
struct SendGuard {
    state: Arc<RwLock<ControllerState>>,
    events: broadcast::Sender<TranscriptEvent>,
    send_id: u64,
    cancel: CancellationToken,
    settled: bool,
}

impl SendGuard {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!("Send {} dropped before it settled", self.send_id);
        self.cancel.cancel();

        let send_id = self.send_id;
        match self.state.try_write() {
            Ok(mut state) => state.release(send_id, &self.events),
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let state = Arc::clone(&self.state);
                    let events = self.events.clone();
                    handle.spawn(async move {
                        state.write().await.release(send_id, &events);
                    });
                }
                Err(_) => warn!("Send {} dropped outside a runtime, reply left open", send_id),
            },
        }
    }
}

pub struct SessionController<B: ChatBackend, S: SessionStorage> {
    identity: Arc<IdentityProvider<S>>,
    backend: Arc<B>,
    streams: StreamClient,
    settings: ControllerSettings,
    state: Arc<RwLock<ControllerState>>,
    events: broadcast::Sender<TranscriptEvent>,
    shutdown: CancellationToken,
    next_send: AtomicU64,
}

impl<B: ChatBackend, S: SessionStorage> SessionController<B, S> {
    /// Build a controller and resolve its starting mode.
    ///
    /// Without a credential the controller starts in guest mode. With one it
    /// resolves a persistent conversation; if that fails for any reason it
    /// logs a warning and starts in guest mode instead.
    pub async fn connect(
        identity: Arc<IdentityProvider<S>>,
        backend: Arc<B>,
        streams: StreamClient,
        settings: ControllerSettings,
        credential: Option<Credential>,
    ) -> Self {
        let session_id = identity.get_or_create_session_id().await;
        let mut transcript = Transcript::new(settings.greeting.clone());

        let (credential, active_chat) = match credential {
            None => (None, None),
            Some(credential) => {
                match resolve_conversation(
                    backend.as_ref(),
                    &identity,
                    &credential,
                    settings.history_limit,
                )
                .await
                {
                    Ok(resolved) => {
                        transcript.replace(into_messages(resolved.history));
                        (Some(credential), Some(resolved.chat_id))
                    }
                    Err(e) => {
                        warn!("Could not open a conversation, continuing as guest: {}", e);
                        (None, None)
                    }
                }
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            identity,
            backend,
            streams,
            settings,
            state: Arc::new(RwLock::new(ControllerState {
                session_id,
                credential,
                active_chat,
                transcript,
                machine: StateMachine::new(),
                active: None,
            })),
            events,
            shutdown: CancellationToken::new(),
            next_send: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub async fn mode(&self) -> Option<Mode> {
        self.state.read().await.mode()
    }

    pub async fn is_persistent(&self) -> bool {
        self.state.read().await.credential.is_some()
    }

    pub async fn session_id(&self) -> String {
        self.state.read().await.session_id.clone()
    }

    pub async fn active_chat(&self) -> Option<ChatId> {
        self.state.read().await.active_chat.clone()
    }

    pub async fn is_sending(&self) -> bool {
        self.state.read().await.active.is_some()
    }

    pub async fn send_state(&self) -> SendState {
        self.state.read().await.machine.state().clone()
    }

    pub async fn transcript(&self) -> Transcript {
        self.state.read().await.transcript.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.transcript.messages().to_vec()
    }

    /// Send `text` and stream the reply into the transcript.
    ///
    /// Returns once the reply has ended. Blank input and sends issued while
    /// another reply is in flight are skipped without touching the
    /// transcript. A stream failure is recorded on the reply entry and also
    /// returned as an error.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() || self.shutdown.is_cancelled() {
            return Ok(SendOutcome::Skipped);
        }

        let needs_conversation = {
            let state = self.state.read().await;
            if state.machine.state().is_busy() {
                debug!("Send skipped: a reply is already in flight");
                return Ok(SendOutcome::Skipped);
            }
            state.mode().is_none()
        };
        if needs_conversation {
            self.new_conversation().await?;
        }

        let send_id = self.next_send.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let (reply_id, request) = {
            let mut state = self.state.write().await;
            let mode = state.mode().ok_or(ControllerError::NoActiveConversation)?;
            if state.transcript.in_flight().is_some()
                || state
                    .machine
                    .try_handle_event(ChatEvent::UserMessageSent)
                    .is_err()
            {
                debug!("Send skipped: a reply is already in flight");
                return Ok(SendOutcome::Skipped);
            }

            let user = state.transcript.push_user(text).clone();
            self.emit(TranscriptEvent::MessageAppended(user));
            let Some(reply) = state.transcript.begin_reply().cloned() else {
                state.machine.handle_event(ChatEvent::UserCancelled);
                return Ok(SendOutcome::Skipped);
            };
            self.emit(TranscriptEvent::MessageAppended(reply.clone()));

            state.active = Some(ActiveSend {
                id: send_id,
                reply_id: reply.id.clone(),
                cancel: cancel.clone(),
            });
            (reply.id, self.stream_request(&mode, text))
        };
        let guard = self.guard(send_id, cancel.clone());

        debug!("Streaming reply {} for send {}", reply_id, send_id);
        let mut stream = self.streams.open(request, cancel);
        let mut outcome = Ok(SendOutcome::Cancelled);

        while let Some(event) = stream.next().await {
            let mut state = self.state.write().await;
            if !state.owns(send_id) {
                break;
            }
            match event {
                StreamEvent::Token(token) => {
                    state.machine.handle_event(ChatEvent::TokenReceived);
                    if state.transcript.append_token(&reply_id, &token) {
                        self.emit(TranscriptEvent::TokenAppended {
                            id: reply_id.clone(),
                            token,
                        });
                    }
                }
                StreamEvent::Done => {
                    state.machine.handle_event(ChatEvent::StreamEnded);
                    state.active = None;
                    if let Some(msg) = state.transcript.finalize(&reply_id).cloned() {
                        self.emit(TranscriptEvent::MessageFinalized(msg));
                    }
                    outcome = Ok(SendOutcome::Completed);
                }
                StreamEvent::Error(e) => {
                    warn!("Reply {} failed: {}", reply_id, e);
                    let reason = e.to_string();
                    state.machine.handle_event(ChatEvent::StreamFailed {
                        error: reason.clone(),
                    });
                    state.active = None;
                    if let Some(msg) = state.transcript.fail(&reply_id, &reason).cloned() {
                        self.emit(TranscriptEvent::MessageFinalized(msg));
                    }
                    outcome = Err(ControllerError::Stream(e));
                }
            }
        }

        // Stream ended by shutdown without an explicit abort
        self.state.write().await.release(send_id, &self.events);
        guard.settle();
        outcome
    }

    /// Non-streaming exchange for guest sessions.
    pub async fn ask(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() || self.shutdown.is_cancelled() {
            return Ok(SendOutcome::Skipped);
        }

        let send_id = self.next_send.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let (reply_id, session_id) = {
            let mut state = self.state.write().await;
            if state.credential.is_some() {
                return Err(ControllerError::PersistentMode);
            }
            if state.transcript.in_flight().is_some()
                || state
                    .machine
                    .try_handle_event(ChatEvent::UserMessageSent)
                    .is_err()
            {
                return Ok(SendOutcome::Skipped);
            }

            let user = state.transcript.push_user(text).clone();
            self.emit(TranscriptEvent::MessageAppended(user));
            let Some(reply) = state.transcript.begin_reply().cloned() else {
                state.machine.handle_event(ChatEvent::UserCancelled);
                return Ok(SendOutcome::Skipped);
            };
            self.emit(TranscriptEvent::MessageAppended(reply.clone()));

            state.active = Some(ActiveSend {
                id: send_id,
                reply_id: reply.id.clone(),
                cancel: cancel.clone(),
            });
            (reply.id, state.session_id.clone())
        };
        let guard = self.guard(send_id, cancel.clone());

        let reply = tokio::select! {
            _ = cancel.cancelled() => None,
            reply = self.backend.chat(&session_id, text) => Some(reply),
        };

        let mut state = self.state.write().await;
        guard.settle();
        if !state.owns(send_id) {
            return Ok(SendOutcome::Cancelled);
        }
        match reply {
            Some(Ok(content)) => {
                state.transcript.set_content(&reply_id, content);
                state.machine.handle_event(ChatEvent::StreamEnded);
                state.active = None;
                if let Some(msg) = state.transcript.finalize(&reply_id).cloned() {
                    self.emit(TranscriptEvent::MessageFinalized(msg));
                }
                Ok(SendOutcome::Completed)
            }
            Some(Err(e)) => {
                warn!("Reply {} failed: {}", reply_id, e);
                let reason = e.to_string();
                state.machine.handle_event(ChatEvent::StreamFailed {
                    error: reason.clone(),
                });
                state.active = None;
                if let Some(msg) = state.transcript.fail(&reply_id, &reason).cloned() {
                    self.emit(TranscriptEvent::MessageFinalized(msg));
                }
                Err(e.into())
            }
            None => {
                state.release(send_id, &self.events);
                Ok(SendOutcome::Cancelled)
            }
        }
    }

    /// Abandon the reply in flight, keeping what arrived so far.
    ///
    /// Returns false if nothing was in flight.
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.write().await;
        if state.active.is_none() {
            return false;
        }
        info!("Cancelling reply in flight");
        if let Some(msg) = state.abort_active() {
            self.emit(TranscriptEvent::MessageFinalized(msg));
        }
        true
    }

    /// Cancel any reply in flight and refuse further sends.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.cancel().await;
    }

    /// Start an empty conversation.
    ///
    /// Guests keep their session id and only the local transcript is
    /// cleared. Signed-in users get a new server-side chat, which becomes the
    /// active one.
    pub async fn new_conversation(&self) -> Result<()> {
        let credential = self.state.read().await.credential.clone();
        let chat_id = match &credential {
            Some(credential) => Some(self.backend.create_chat(credential, false).await?),
            None => None,
        };

        let mut state = self.state.write().await;
        self.abort_for_lifecycle(&mut state);
        state.transcript.reset();
        if let Some(chat_id) = chat_id {
            info!("Started chat {}", chat_id);
            self.identity.set_active_chat_id(Some(&chat_id)).await;
            state.active_chat = Some(chat_id);
        }
        self.emit_replaced(&state);
        Ok(())
    }

    /// Open an existing persistent conversation and load its history.
    pub async fn switch_conversation(&self, chat_id: &ChatId) -> Result<()> {
        let credential = self.require_credential().await?;
        let history = self
            .backend
            .load_messages(&credential, chat_id, self.settings.history_limit)
            .await?;

        let mut state = self.state.write().await;
        self.abort_for_lifecycle(&mut state);
        state.transcript.replace(into_messages(history));
        state.active_chat = Some(chat_id.clone());
        self.identity.set_active_chat_id(Some(chat_id)).await;
        info!("Switched to chat {}", chat_id);
        self.emit_replaced(&state);
        Ok(())
    }

    /// Delete a persistent conversation.
    ///
    /// Deleting the active one leaves no conversation open; the next send
    /// starts a new one.
    pub async fn delete_conversation(&self, chat_id: &ChatId) -> Result<()> {
        let credential = self.require_credential().await?;
        self.backend.delete_chat(&credential, chat_id).await?;

        let mut state = self.state.write().await;
        if state.active_chat.as_ref() == Some(chat_id) {
            self.abort_for_lifecycle(&mut state);
            state.active_chat = None;
            state.transcript.reset();
            self.identity.set_active_chat_id(None).await;
            self.emit_replaced(&state);
        }
        info!("Deleted chat {}", chat_id);
        Ok(())
    }

    /// Clear the conversation.
    ///
    /// Guests drop their server-side history, signed-in users start a new
    /// chat.
    pub async fn reset(&self) -> Result<()> {
        let guest_session = {
            let state = self.state.read().await;
            state
                .credential
                .is_none()
                .then(|| state.session_id.clone())
        };
        let Some(session_id) = guest_session else {
            return self.new_conversation().await;
        };

        self.backend.reset_session(&session_id).await?;
        let mut state = self.state.write().await;
        self.abort_for_lifecycle(&mut state);
        state.transcript.reset();
        self.emit_replaced(&state);
        Ok(())
    }

    /// Persistent conversations, journals excluded.
    pub async fn list_conversations(&self) -> Result<Vec<ChatSummary>> {
        let credential = self.require_credential().await?;
        let chats = self.backend.list_chats(&credential).await?;
        Ok(chats.into_iter().filter(|c| !c.is_journal).collect())
    }

    async fn require_credential(&self) -> Result<Credential> {
        self.state
            .read()
            .await
            .credential
            .clone()
            .ok_or(ControllerError::GuestMode)
    }

    fn guard(&self, send_id: u64, cancel: CancellationToken) -> SendGuard {
        SendGuard {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            send_id,
            cancel,
            settled: false,
        }
    }

    fn stream_request(&self, mode: &Mode, text: &str) -> StreamRequest {
        let (key, value) = mode.scope_param();
        let request = StreamRequest::new(self.backend.stream_endpoint())
            .param(key, value)
            .param("message", text);
        match mode.credential() {
            Some(credential) => request.bearer(credential.expose()),
            None => request,
        }
    }

    fn abort_for_lifecycle(&self, state: &mut ControllerState) {
        if let Some(msg) = state.abort_active() {
            self.emit(TranscriptEvent::MessageFinalized(msg));
        }
        state.machine.handle_event(ChatEvent::ConversationReset);
    }

    fn emit_replaced(&self, state: &ControllerState) {
        self.emit(TranscriptEvent::TranscriptReplaced(
            state.transcript.messages().to_vec(),
        ));
    }

    fn emit(&self, event: TranscriptEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl<B: ChatBackend, S: SessionStorage> Drop for SessionController<B, S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn into_messages(history: Vec<StoredMessage>) -> Vec<Message> {
    history.into_iter().map(StoredMessage::into_message).collect()
}
