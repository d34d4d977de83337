// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chat session facade: composes the selector, store, agent, and
//! cancellation tokens behind one surface.
//!
//! Per-conversation lifecycle is `Idle → Sending → Streaming → Idle`
//! (success, error, and cancellation all return to idle). Switching the
//! active conversation never cancels an in-flight request: its updates keep
//! flowing into its own conversation, and only the rendering projection
//! ([`ChatSession::visible_messages`]) filters by the active pointer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::agent::{AgentEventKind, ChatAgent, RequestBinding};
use crate::cancel::CancelToken;
use crate::config::ChatConfig;
use crate::error::{ChatError, SessionError};
use crate::model::ModelSelector;
use crate::providers::{DeepSeekBackend, SharedBackend};
use crate::store::{ConversationId, ConversationStore, MessagePatch, StoredMessage};
use crate::types::{MessageStatus, MessageView, ModelConfig, Role, WireMessage};

/// Maximum title length derived from the first user message.
const TITLE_MAX_CHARS: usize = 30;

/// Buffered session events per subscriber.
const EVENT_CAPACITY: usize = 256;

/// Request lifecycle phase of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    Streaming,
}

/// Sidebar item for conversation-list collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationItem {
    pub id: ConversationId,
    pub title: String,
}

/// Events broadcast to rendering collaborators, tagged with the owning
/// conversation so subscribers can filter.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    RequestStarted {
        conversation_id: ConversationId,
    },
    /// The conversation's projection changed; re-read `visible_messages`
    /// (or `messages_of`) to refresh.
    MessagesUpdated {
        conversation_id: ConversationId,
    },
    RequestFinished {
        conversation_id: ConversationId,
        message_id: String,
        status: MessageStatus,
        /// Failure text for transient notification. `None` for success and
        /// for user-initiated cancellation.
        error: Option<String>,
    },
}

/// Binds one cancellation token to one assistant message in one
/// conversation; used to discard late updates after cancellation.
#[derive(Debug, Clone)]
struct RequestHandle {
    message_id: String,
    token: CancelToken,
}

#[derive(Default)]
struct SessionInner {
    store: ConversationStore,
    requests: HashMap<ConversationId, RequestHandle>,
    phases: HashMap<ConversationId, Phase>,
}

impl SessionInner {
    fn phase(&self, conversation_id: &str) -> Phase {
        self.phases
            .get(conversation_id)
            .copied()
            .unwrap_or_default()
    }
}

/// The streaming chat session engine.
///
/// Cheap to clone; clones share state. All mutation of conversation and
/// message records goes through the internal store, written only by the
/// per-request driver task (single writer per message).
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Mutex<SessionInner>>,
    agent: ChatAgent,
    selector: Arc<ModelSelector>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Build a session over the DeepSeek backend. Fails fast on a client
    /// construction problem; the credential itself was validated by
    /// [`ChatConfig`].
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let backend = Arc::new(DeepSeekBackend::new(config)?);
        Ok(Self::with_backend(
            backend,
            ModelSelector::new(&config.chat_model, &config.reasoner_model),
        ))
    }

    /// Build a session over any backend (tests inject scripted streams).
    pub fn with_backend(backend: SharedBackend, selector: ModelSelector) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(SessionInner::default())),
            agent: ChatAgent::new(backend),
            selector: Arc::new(selector),
            events,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Switch between the base and reasoning-capable model for future
    /// sends. Requests already dispatched are unaffected.
    pub fn set_reasoning_enabled(&self, enabled: bool) {
        self.selector.set_reasoning_enabled(enabled);
    }

    pub fn reasoning_enabled(&self) -> bool {
        self.selector.reasoning_enabled()
    }

    /// The model the next send would use.
    pub fn current_model(&self) -> ModelConfig {
        self.selector.current_model()
    }

    /// Send user text into the active conversation, creating one when none
    /// is active. Rejected synchronously while the conversation already has
    /// a request in flight.
    pub fn send(&self, text: &str) -> Result<(), SessionError> {
        let (binding, model, history, token) = {
            let mut inner = self.lock();

            let conversation_id = match inner.store.active_id() {
                Some(id) => id.clone(),
                None => inner.store.create_conversation(derive_title(text)),
            };

            if inner.phase(&conversation_id) != Phase::Idle {
                return Err(SessionError::RequestInFlight(conversation_id));
            }

            // First message of an explicitly created conversation names it.
            if inner
                .store
                .conversations()
                .iter()
                .any(|c| c.id == conversation_id && c.title.is_empty())
            {
                inner
                    .store
                    .rename_conversation(&conversation_id, derive_title(text));
            }

            // Snapshot the model once; this captured value is used for the
            // request's entire lifetime.
            let model = self.selector.current_model();

            // At most one live token per conversation: cancel any stale one
            // before minting a fresh token.
            if let Some(stale) = inner.requests.remove(&conversation_id) {
                stale.token.cancel("superseded by new request");
            }

            let user = StoredMessage::user(conversation_id.clone(), text);
            let pending = StoredMessage::pending_assistant(conversation_id.clone());
            let message_id = pending.id.clone();
            inner.store.append_message(user)?;
            inner.store.append_message(pending)?;

            let history = upstream_history(&inner.store, &conversation_id);

            let token = CancelToken::new();
            inner.requests.insert(
                conversation_id.clone(),
                RequestHandle {
                    message_id: message_id.clone(),
                    token: token.clone(),
                },
            );
            inner.phases.insert(conversation_id.clone(), Phase::Sending);

            let binding = RequestBinding {
                conversation_id,
                message_id,
            };
            (binding, model, history, token)
        };

        info!(
            conversation_id = %binding.conversation_id,
            model = %model.id,
            "dispatching request"
        );
        self.emit(SessionEvent::RequestStarted {
            conversation_id: binding.conversation_id.clone(),
        });
        self.emit(SessionEvent::MessagesUpdated {
            conversation_id: binding.conversation_id.clone(),
        });

        let rx = self.agent.run(binding, model, history, token);
        let session = self.clone();
        tokio::spawn(async move {
            session.pump(rx).await;
        });
        Ok(())
    }

    /// Cancel the active conversation's in-flight request, if any. The
    /// message transitions to `cancelled` once the agent confirms; partial
    /// content is preserved. Returns whether a request was cancelled; errs
    /// when no conversation is active.
    pub fn cancel(&self) -> Result<bool, SessionError> {
        let inner = self.lock();
        let Some(active) = inner.store.active_id() else {
            return Err(SessionError::NoActiveConversation);
        };
        match inner.requests.get(active) {
            Some(handle) => {
                handle.token.cancel("user cancelled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start a fresh, untitled conversation and make it active. Any
    /// in-flight request of the previous conversation keeps running in the
    /// background.
    pub fn new_conversation(&self) -> ConversationId {
        self.lock().store.create_conversation("")
    }

    /// Change the active conversation. Always legal; never cancels.
    pub fn switch_conversation(&self, id: &str) -> Result<(), SessionError> {
        self.lock().store.switch_active(id)
    }

    /// Delete a conversation and its messages, cancelling its in-flight
    /// request if one exists.
    pub fn delete_conversation(&self, id: &str) {
        let mut inner = self.lock();
        if let Some(handle) = inner.requests.remove(id) {
            handle.token.cancel("conversation deleted");
        }
        inner.phases.remove(id);
        inner.store.remove_conversation(id);
    }

    /// Currently active conversation id, if any.
    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.lock().store.active_id().cloned()
    }

    /// Conversation list items, most recently created first.
    pub fn conversations(&self) -> Vec<ConversationItem> {
        self.lock()
            .store
            .conversations()
            .iter()
            .map(|c| ConversationItem {
                id: c.id.clone(),
                title: c.title.clone(),
            })
            .collect()
    }

    /// Read-only projection of the active conversation's messages. This is
    /// the only place "currently displayed" filters anything.
    pub fn visible_messages(&self) -> Vec<MessageView> {
        let inner = self.lock();
        match inner.store.active_id() {
            Some(id) => inner.store.views_of(id),
            None => Vec::new(),
        }
    }

    /// Projection of any conversation's messages, active or not.
    pub fn messages_of(&self, conversation_id: &str) -> Vec<MessageView> {
        self.lock().store.views_of(conversation_id)
    }

    /// Lifecycle phase of a conversation.
    pub fn phase_of(&self, conversation_id: &str) -> Phase {
        self.lock().phase(conversation_id)
    }

    /// Whether the active conversation has a request in flight.
    pub fn is_busy(&self) -> bool {
        let inner = self.lock();
        match inner.store.active_id() {
            Some(id) => inner.phase(id) != Phase::Idle,
            None => false,
        }
    }

    /// Drive one request's agent events into the store. Runs as a spawned
    /// task; the single writer for its message.
    async fn pump(&self, mut rx: tokio::sync::mpsc::Receiver<crate::agent::AgentEvent>) {
        while let Some(event) = rx.recv().await {
            let conversation_id = event.conversation_id;
            let message_id = event.message_id;
            match event.kind {
                AgentEventKind::Delta {
                    reasoning_content,
                    content,
                } => {
                    let applied = {
                        let mut inner = self.lock();
                        inner
                            .phases
                            .insert(conversation_id.clone(), Phase::Streaming);
                        inner.store.update_message(
                            &conversation_id,
                            &message_id,
                            MessagePatch::progress(reasoning_content, content),
                        )
                    };
                    if applied {
                        self.emit(SessionEvent::MessagesUpdated {
                            conversation_id: conversation_id.clone(),
                        });
                    }
                }
                AgentEventKind::Completed {
                    reasoning_content,
                    content,
                } => {
                    self.finish(
                        &conversation_id,
                        &message_id,
                        MessagePatch {
                            content: Some(content),
                            reasoning_content: Some(reasoning_content),
                            status: Some(MessageStatus::Success),
                        },
                        None,
                    );
                }
                AgentEventKind::Failed(err) => {
                    self.finish(
                        &conversation_id,
                        &message_id,
                        MessagePatch::terminal(MessageStatus::Error),
                        Some(err.to_string()),
                    );
                }
                AgentEventKind::Cancelled => {
                    // Partial content stays as already aggregated.
                    self.finish(
                        &conversation_id,
                        &message_id,
                        MessagePatch::terminal(MessageStatus::Cancelled),
                        None,
                    );
                }
            }
        }
    }

    /// Apply the terminal patch, release the request handle, and return the
    /// conversation to idle.
    fn finish(
        &self,
        conversation_id: &str,
        message_id: &str,
        patch: MessagePatch,
        error: Option<String>,
    ) {
        let status = patch.status.unwrap_or(MessageStatus::Error);
        {
            let mut inner = self.lock();
            inner.store.update_message(conversation_id, message_id, patch);

            // Only release state still owned by this request: the
            // conversation may have been deleted mid-stream.
            let owns = inner
                .requests
                .get(conversation_id)
                .is_some_and(|h| h.message_id == message_id);
            if owns {
                inner.requests.remove(conversation_id);
            }
            let exists = inner
                .store
                .conversations()
                .iter()
                .any(|c| c.id == conversation_id);
            if exists {
                inner.phases.insert(conversation_id.to_string(), Phase::Idle);
            } else {
                inner.phases.remove(conversation_id);
            }
        }

        debug!(conversation_id, message_id, status = %status, "request settled");
        self.emit(SessionEvent::MessagesUpdated {
            conversation_id: conversation_id.to_string(),
        });
        self.emit(SessionEvent::RequestFinished {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            status,
            error,
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// History replayed to the model: user messages plus successfully completed
/// assistant replies. Errored and cancelled assistant text stays visible in
/// the conversation but is not sent upstream.
fn upstream_history(store: &ConversationStore, conversation_id: &str) -> Vec<WireMessage> {
    store
        .messages_of(conversation_id)
        .iter()
        .filter(|m| match m.role {
            Role::User => true,
            Role::Assistant => m.status == MessageStatus::Success,
        })
        .map(|m| match m.role {
            Role::User => WireMessage::user(m.content.clone()),
            Role::Assistant => WireMessage::assistant(m.content.clone()),
        })
        .collect()
}

/// Conversation title from the first user message, truncated at a char
/// boundary.
fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    }
}
