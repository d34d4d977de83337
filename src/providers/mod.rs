// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Completion backend implementations.
//!
//! The [`CompletionBackend`] trait is the seam between the chat agent and
//! the network: production code uses [`deepseek::DeepSeekBackend`], tests
//! inject scripted streams.

pub mod deepseek;

pub use deepseek::DeepSeekBackend;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChatError;
use crate::types::{ChatRequest, StreamChunk};

/// An ordered, incrementally produced sequence of stream chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ChatError>> + Send>>;

/// A streaming completion endpoint.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streaming completion request and return the chunk sequence.
    ///
    /// Transport failures before the first chunk are returned directly;
    /// failures mid-stream surface as `Err` items in the stream.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, ChatError>;
}

/// Shared backend handle.
pub type SharedBackend = Arc<dyn CompletionBackend>;
