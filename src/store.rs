// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation store: the single owner of all conversation and message
//! records.
//!
//! Message order within a conversation is insertion order and never
//! reordered. `update_message` enforces the one-way status lifecycle:
//! writes against a terminal message, or against the wrong owning
//! conversation, are rejected as no-ops.

use std::collections::HashMap;

use tracing::warn;

use crate::error::SessionError;
use crate::types::{MessageStatus, MessageView, Role};

/// Conversation identifier.
pub type ConversationId = String;

/// An ordered thread of messages.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Opaque, stable id assigned at creation.
    pub id: ConversationId,
    /// Derived from the first user message; the only mutable field.
    pub title: String,
    /// Monotonic ordering key.
    pub created_at: i64,
}

impl Conversation {
    fn new(title: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A message owned by the store.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Unique within the conversation.
    pub id: String,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    pub reasoning_content: String,
    pub status: MessageStatus,
}

impl StoredMessage {
    /// A user message; always `Local`, never transitions.
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id,
            role: Role::User,
            content: content.into(),
            reasoning_content: String::new(),
            status: MessageStatus::Local,
        }
    }

    /// An empty pending assistant message, born `Streaming`.
    pub fn pending_assistant(conversation_id: ConversationId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id,
            role: Role::Assistant,
            content: String::new(),
            reasoning_content: String::new(),
            status: MessageStatus::Streaming,
        }
    }

    fn view(&self) -> MessageView {
        MessageView {
            id: self.id.clone(),
            role: self.role,
            content: self.content.clone(),
            reasoning_content: self.reasoning_content.clone(),
            status: self.status,
        }
    }
}

/// Partial update applied to a streaming message. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub status: Option<MessageStatus>,
}

impl MessagePatch {
    /// Progress patch carrying the latest aggregated pair.
    pub fn progress(reasoning_content: String, content: String) -> Self {
        Self {
            content: Some(content),
            reasoning_content: Some(reasoning_content),
            status: None,
        }
    }

    /// Terminal patch setting the final status.
    pub fn terminal(status: MessageStatus) -> Self {
        Self {
            content: None,
            reasoning_content: None,
            status: Some(status),
        }
    }
}

/// Ordered collection of conversations and their message histories.
///
/// Every conversation's history is retained and addressable by id, so a
/// background conversation can finish streaming unobserved and be intact
/// when the user switches back.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<StoredMessage>>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation, insert it at the front of the list, and make
    /// it active.
    pub fn create_conversation(&mut self, title: impl Into<String>) -> ConversationId {
        let conversation = Conversation::new(title.into());
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.messages.insert(id.clone(), Vec::new());
        self.active = Some(id.clone());
        id
    }

    /// Change the active pointer. The previous conversation's messages are
    /// untouched and remain addressable.
    pub fn switch_active(&mut self, id: &str) -> Result<(), SessionError> {
        if !self.messages.contains_key(id) {
            return Err(SessionError::UnknownConversation(id.to_string()));
        }
        self.active = Some(id.to_string());
        Ok(())
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Conversations in list order (most recently created first).
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Set a conversation's title (derived from its first user message).
    pub fn rename_conversation(&mut self, id: &str, title: impl Into<String>) {
        if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) {
            conversation.title = title.into();
        }
    }

    /// Remove a conversation and its messages. Clears the active pointer if
    /// it pointed at the removed conversation.
    pub fn remove_conversation(&mut self, id: &str) {
        self.conversations.retain(|c| c.id != id);
        self.messages.remove(id);
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
    }

    /// Append a message to its conversation.
    pub fn append_message(&mut self, message: StoredMessage) -> Result<(), SessionError> {
        let thread = self
            .messages
            .get_mut(&message.conversation_id)
            .ok_or_else(|| SessionError::UnknownConversation(message.conversation_id.clone()))?;
        thread.push(message);
        Ok(())
    }

    /// Apply a patch to a message. Returns `false` without mutating when the
    /// conversation does not own the message or the message is already
    /// terminal.
    pub fn update_message(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        patch: MessagePatch,
    ) -> bool {
        let Some(thread) = self.messages.get_mut(conversation_id) else {
            return false;
        };
        let Some(message) = thread.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        if message.status.is_terminal() {
            warn!(
                conversation_id,
                message_id, "rejected update to terminal message"
            );
            return false;
        }

        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(reasoning) = patch.reasoning_content {
            message.reasoning_content = reasoning;
        }
        if let Some(status) = patch.status {
            message.status = status;
        }
        true
    }

    /// Messages of a conversation in insertion order.
    pub fn messages_of(&self, conversation_id: &str) -> &[StoredMessage] {
        self.messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Read-only projection of a conversation's messages for rendering.
    pub fn views_of(&self, conversation_id: &str) -> Vec<MessageView> {
        self.messages_of(conversation_id)
            .iter()
            .map(StoredMessage::view)
            .collect()
    }
}
