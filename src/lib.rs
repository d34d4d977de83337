// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streaming chat session engine for DeepSeek-style chat completion APIs.
//!
//! The crate is layered bottom-up:
//!
//! - [`aggregator`]: folds stream chunks into a monotonic
//!   `(reasoning_content, content)` pair, inserting the reasoning
//!   transition marker exactly once.
//! - [`cancel`]: one-way, idempotent cancellation tokens checked
//!   cooperatively at chunk granularity.
//! - [`providers`]: the [`providers::CompletionBackend`] trait and the SSE
//!   DeepSeek implementation.
//! - [`agent`]: drives one request from dispatch to exactly one terminal
//!   event; never touches the store.
//! - [`store`]: the single owner of conversation and message records.
//! - [`session`]: the facade wiring all of the above together behind
//!   `send` / `cancel` / conversation management.
//!
//! A frontend consumes [`session::ChatSession`], subscribes to its event
//! stream, and re-reads projections when told to.

pub mod agent;
pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod model;
pub mod providers;
pub mod session;
pub mod store;
pub mod types;

pub use agent::{AgentEvent, AgentEventKind, ChatAgent, RequestBinding};
pub use aggregator::{StreamAggregator, REASONING_END_MARKER};
pub use cancel::CancelToken;
pub use config::ChatConfig;
pub use error::{ChatError, ConfigError, Result, SessionError};
pub use model::ModelSelector;
pub use providers::{ChunkStream, CompletionBackend, DeepSeekBackend, SharedBackend};
pub use session::{ChatSession, ConversationItem, Phase, SessionEvent};
pub use store::{ConversationId, ConversationStore, MessagePatch, StoredMessage};
pub use types::{
    ChatRequest, MessageStatus, MessageView, ModelConfig, Role, StreamChunk, WireMessage,
};
