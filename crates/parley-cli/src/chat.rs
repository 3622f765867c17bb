//! Client side of a conversation.
//!
//! A [`ChatSession`] owns the finalized message list and at most one in-flight
//! reply. Frames from the transport drive it through
//! `Idle -> Sending -> Streaming -> Idle`. A terminal `done` finalizes the
//! accumulated text into a message, an `error` frame or transport failure adds a
//! synthetic assistant message, and cancellation discards the partial reply.
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parley::models::message::Message;
use parley::models::role::Role;
use parley::protocol::Frame;
use parley::session::{SessionStore, StoredMessage};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::errors::ChatError;
use crate::transport::{ReplyRequest, Transport};

/// Appended between the text of consecutive rounds
const ROUND_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    Streaming,
}

/// The last tool the model called while producing a reply
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tool_use: Option<ToolUse>,
}

impl ChatMessage {
    fn new<S: Into<String>>(role: Role, content: S, tool_use: Option<ToolUse>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_use,
        }
    }

    fn failure(error: &str) -> Self {
        Self::new(
            Role::Assistant,
            format!("Sorry, an error occurred: {}", error),
            None,
        )
    }

    fn to_message(&self) -> Message {
        Message::new(self.role).with_text(self.content.clone())
    }

    fn to_stored(&self) -> StoredMessage {
        StoredMessage {
            role: self.role,
            content: self.content.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// How a call to [`ChatSession::send`] ended
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Completed(ChatMessage),
    /// The reply failed; the message is the synthetic error shown to the user
    Failed(ChatMessage),
    Cancelled,
}

struct InFlight {
    id: u64,
    text: String,
    tool_use: Option<ToolUse>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ChatState {
    phase: Phase,
    messages: Vec<ChatMessage>,
    in_flight: Option<InFlight>,
    next_id: u64,
}

impl ChatState {
    /// Whether `id` is still the reply in flight
    fn is_current(&self, id: u64) -> bool {
        self.in_flight.as_ref().is_some_and(|flight| flight.id == id)
    }

    fn finish(&mut self, message: Option<ChatMessage>) {
        if let Some(message) = message {
            self.messages.push(message);
        }
        self.in_flight = None;
        self.phase = Phase::Idle;
    }
}

enum Applied {
    Continue,
    Finished(SendOutcome),
    /// The reply this frame belongs to was cancelled
    Stale,
}

pub struct ChatSession {
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    agent_id: String,
    session_id: String,
    state: Mutex<ChatState>,
}

impl ChatSession {
    pub fn new<A: Into<String>, S: Into<String>>(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        agent_id: A,
        session_id: S,
    ) -> Self {
        Self {
            transport,
            store,
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            state: Mutex::new(ChatState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase() != Phase::Idle
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state().messages.clone()
    }

    /// The partial reply being streamed, present only while loading
    pub fn streaming_text(&self) -> Option<String> {
        self.state()
            .in_flight
            .as_ref()
            .map(|flight| flight.text.clone())
    }

    /// Send a user message and drive the reply to its end.
    ///
    /// `on_frame` sees every frame that changed the session, in order, after the
    /// change is applied. Frames arriving after [`cancel`](Self::cancel) are
    /// dropped unseen.
    pub async fn send<F>(&self, content: &str, mut on_frame: F) -> Result<SendOutcome, ChatError>
    where
        F: FnMut(&Frame) + Send,
    {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let user = ChatMessage::new(Role::User, content, None);
        let (id, cancel, history) = {
            let mut state = self.state();
            if state.phase != Phase::Idle {
                return Err(ChatError::Busy);
            }
            state.messages.push(user.clone());
            let history: Vec<Message> = state
                .messages
                .iter()
                .filter(|message| !message.content.is_empty())
                .map(ChatMessage::to_message)
                .collect();

            let id = state.next_id;
            state.next_id += 1;
            let cancel = CancellationToken::new();
            state.in_flight = Some(InFlight {
                id,
                text: String::new(),
                tool_use: None,
                cancel: cancel.clone(),
            });
            state.phase = Phase::Sending;
            (id, cancel, history)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SendOutcome::Cancelled),
            _ = self.persist(&user) => {}
        }

        let request = ReplyRequest {
            messages: history,
            agent_id: self.agent_id.clone(),
            session_id: Some(self.session_id.clone()),
        };
        let mut frames = match self.transport.open(request, cancel.clone()).await {
            Ok(frames) => frames,
            Err(e) => return Ok(self.fail(id, e)),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Some(Err(ChatError::Cancelled)),
                next = frames.next() => next,
            };
            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Ok(self.fail(id, e)),
                None => {
                    let closed =
                        ChatError::Transport("connection closed before the response completed".into());
                    return Ok(self.fail(id, closed));
                }
            };

            match self.apply(id, &frame) {
                Applied::Continue => on_frame(&frame),
                Applied::Stale => return Ok(SendOutcome::Cancelled),
                Applied::Finished(outcome) => {
                    on_frame(&frame);
                    if let SendOutcome::Completed(message) = &outcome {
                        self.persist(message).await;
                    }
                    return Ok(outcome);
                }
            }
        }
    }

    fn apply(&self, id: u64, frame: &Frame) -> Applied {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(flight) = state.in_flight.as_mut().filter(|flight| flight.id == id) else {
            return Applied::Stale;
        };

        match frame {
            Frame::Start => {
                flight.text.clear();
                state.phase = Phase::Streaming;
            }
            Frame::Text { content } => flight.text.push_str(content),
            Frame::ToolUseStart { tool_name, tool_id } => {
                flight.tool_use = Some(ToolUse {
                    id: tool_id.clone(),
                    name: tool_name.clone(),
                    input: json!({}),
                });
            }
            Frame::ToolUseComplete { tool_use } => {
                flight.tool_use = Some(ToolUse {
                    id: tool_use.id.clone(),
                    name: tool_use.name.clone(),
                    input: tool_use.input.clone(),
                });
            }
            Frame::Continuing => flight.text.push_str(ROUND_SEPARATOR),
            Frame::Done => {
                let text = std::mem::take(&mut flight.text);
                let tool_use = flight.tool_use.take();
                let message = ChatMessage::new(Role::Assistant, text, tool_use);
                state.finish(Some(message.clone()));
                return Applied::Finished(SendOutcome::Completed(message));
            }
            Frame::Error { error } => {
                tracing::warn!(session_id = %self.session_id, "reply failed: {}", error);
                let message = ChatMessage::failure(error);
                state.finish(Some(message.clone()));
                return Applied::Finished(SendOutcome::Failed(message));
            }
        }
        Applied::Continue
    }

    /// End the reply `id` because of `error`
    fn fail(&self, id: u64, error: ChatError) -> SendOutcome {
        let mut state = self.state();
        if !state.is_current(id) {
            return SendOutcome::Cancelled;
        }
        if error.is_cancelled() {
            state.finish(None);
            return SendOutcome::Cancelled;
        }
        tracing::warn!(session_id = %self.session_id, "reply failed: {}", error);
        let message = ChatMessage::failure(&error.to_string());
        state.finish(Some(message.clone()));
        SendOutcome::Failed(message)
    }

    /// Abort the in-flight reply, discarding its partial text.
    ///
    /// Returns false when there was nothing to cancel.
    pub fn cancel(&self) -> bool {
        let mut state = self.state();
        match state.in_flight.take() {
            Some(flight) => {
                flight.cancel.cancel();
                state.phase = Phase::Idle;
                tracing::info!(session_id = %self.session_id, "reply cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop every finalized message. Not allowed while a reply is in flight.
    pub fn clear(&self) -> Result<(), ChatError> {
        let mut state = self.state();
        if state.phase != Phase::Idle {
            return Err(ChatError::Busy);
        }
        state.messages.clear();
        Ok(())
    }

    async fn persist(&self, message: &ChatMessage) {
        if let Err(e) = self
            .store
            .append_message(&self.session_id, &self.agent_id, message.to_stored())
            .await
        {
            tracing::warn!(
                session_id = %self.session_id,
                role = %message.role,
                "Failed to save message: {}",
                e
            );
        }
    }
}
