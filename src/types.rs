// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core type definitions for the dwchat session engine.
//!
//! Holds the message roles and statuses, the model descriptor, the
//! incremental stream chunk, and the wire-level request types sent to the
//! completion endpoint.

use serde::{Deserialize, Serialize};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Lifecycle status of a message.
///
/// A user message is always `Local` and never transitions. An assistant
/// message starts `Streaming` and ends in exactly one of the terminal
/// statuses; once terminal it is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// User-authored message, created locally.
    Local,
    /// Assistant message currently receiving deltas.
    Streaming,
    /// Assistant message completed normally.
    Success,
    /// Assistant message terminated by a network or protocol failure.
    Error,
    /// Assistant message cut short by user cancellation.
    Cancelled,
}

impl MessageStatus {
    /// Terminal statuses permit no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::Streaming => "streaming",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Descriptor for a selectable model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Model identifier sent on the wire.
    pub id: String,
    /// Whether the model streams a reasoning trace before the answer.
    pub supports_reasoning: bool,
}

impl ModelConfig {
    pub fn new(id: impl Into<String>, supports_reasoning: bool) -> Self {
        Self {
            id: id.into(),
            supports_reasoning,
        }
    }
}

/// One incremental unit of a streamed completion response.
///
/// The wire-field alias (`reasoning_content` vs `reasoning`) is resolved by
/// the backend before a chunk is constructed; by this point `reasoning_delta`
/// is the single canonical field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Delta of the auxiliary reasoning trace, if any.
    pub reasoning_delta: Option<String>,
    /// Delta of the answer text, if any.
    pub answer_delta: Option<String>,
}

impl StreamChunk {
    /// A chunk carrying only answer text.
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            reasoning_delta: None,
            answer_delta: Some(text.into()),
        }
    }

    /// A chunk carrying only reasoning text.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning_delta: Some(text.into()),
            answer_delta: None,
        }
    }
}

/// A message as sent to the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A streaming completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}

/// Read-only message record exposed to rendering collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub reasoning_content: String,
    pub status: MessageStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_status_terminal() {
        assert!(!MessageStatus::Local.is_terminal());
        assert!(!MessageStatus::Streaming.is_terminal());
        assert!(MessageStatus::Success.is_terminal());
        assert!(MessageStatus::Error.is_terminal());
        assert!(MessageStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let req = ChatRequest::new("deepseek-chat", vec![WireMessage::user("hello")]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_stream_chunk_constructors() {
        let chunk = StreamChunk::answer("42");
        assert_eq!(chunk.answer_delta.as_deref(), Some("42"));
        assert!(chunk.reasoning_delta.is_none());

        let chunk = StreamChunk::reasoning("hmm");
        assert_eq!(chunk.reasoning_delta.as_deref(), Some("hmm"));
        assert!(chunk.answer_delta.is_none());
    }
}
