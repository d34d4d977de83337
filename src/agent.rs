// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chat agent: drives one streaming completion request.
//!
//! The agent is a pure protocol driver. It opens the stream, feeds each chunk
//! through the aggregator, and emits progress events plus exactly one
//! terminal event. It never writes to the conversation store; the session
//! facade subscribes to its events and performs the writes.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::aggregator::StreamAggregator;
use crate::cancel::CancelToken;
use crate::error::ChatError;
use crate::providers::{CompletionBackend, SharedBackend};
use crate::store::ConversationId;
use crate::types::{ChatRequest, ModelConfig, WireMessage};

/// Binds a request to the assistant message it is streaming into.
#[derive(Debug, Clone)]
pub struct RequestBinding {
    pub conversation_id: ConversationId,
    pub message_id: String,
}

/// An event emitted while a request is in flight. Tagged with the owning
/// conversation and message so subscribers never rely on ambient "currently
/// displayed" state.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    pub conversation_id: ConversationId,
    pub message_id: String,
    pub kind: AgentEventKind,
}

/// Progress or terminal payload of an [`AgentEvent`].
///
/// Exactly one terminal variant (`Completed`, `Failed`, or `Cancelled`) is
/// emitted per `run` invocation, always last.
#[derive(Debug, Clone)]
pub enum AgentEventKind {
    /// Latest aggregated `(reasoning_content, content)` pair.
    Delta {
        reasoning_content: String,
        content: String,
    },
    /// Natural end of stream, with the final aggregated pair.
    Completed {
        reasoning_content: String,
        content: String,
    },
    /// Network or protocol failure.
    Failed(ChatError),
    /// Cooperative cancellation observed at a chunk boundary.
    Cancelled,
}

impl AgentEventKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta { .. })
    }
}

/// Drives one outstanding streaming request at a time over a
/// [`CompletionBackend`].
#[derive(Clone)]
pub struct ChatAgent {
    backend: SharedBackend,
}

impl ChatAgent {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Start a request and return its event stream.
    ///
    /// The model is the caller's send-time snapshot; it is used for the
    /// entire lifetime of the request. The token is checked at every chunk
    /// receive point; once cancellation is observed no further delta is
    /// emitted.
    pub fn run(
        &self,
        binding: RequestBinding,
        model: ModelConfig,
        history: Vec<WireMessage>,
        token: CancelToken,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(64);
        let backend = Arc::clone(&self.backend);

        tokio::spawn(async move {
            let terminal = drive(backend, &binding, model, history, token, &tx).await;
            debug!(
                conversation_id = %binding.conversation_id,
                message_id = %binding.message_id,
                terminal = ?terminal_name(&terminal),
                "request finished"
            );
            // Receiver may already be gone; nothing left to do then.
            let _ = tx
                .send(AgentEvent {
                    conversation_id: binding.conversation_id.clone(),
                    message_id: binding.message_id.clone(),
                    kind: terminal,
                })
                .await;
        });

        rx
    }
}

fn terminal_name(kind: &AgentEventKind) -> &'static str {
    match kind {
        AgentEventKind::Delta { .. } => "delta",
        AgentEventKind::Completed { .. } => "completed",
        AgentEventKind::Failed(_) => "failed",
        AgentEventKind::Cancelled => "cancelled",
    }
}

/// Consume the stream until a terminal condition and return it. Progress
/// deltas are sent inline; the caller sends the returned terminal exactly
/// once.
async fn drive(
    backend: Arc<dyn CompletionBackend>,
    binding: &RequestBinding,
    model: ModelConfig,
    history: Vec<WireMessage>,
    token: CancelToken,
    tx: &mpsc::Sender<AgentEvent>,
) -> AgentEventKind {
    let request = ChatRequest::new(model.id.clone(), history);

    let mut stream = match backend.stream_chat(&request).await {
        Ok(stream) => stream,
        Err(err) => return AgentEventKind::Failed(err),
    };

    let mut aggregator = StreamAggregator::new(model.supports_reasoning);

    loop {
        if token.is_cancelled() {
            return AgentEventKind::Cancelled;
        }

        match stream.next().await {
            None => {
                let (reasoning_content, content) = aggregator.snapshot();
                return AgentEventKind::Completed {
                    reasoning_content,
                    content,
                };
            }
            Some(Err(err)) => return AgentEventKind::Failed(err),
            Some(Ok(chunk)) => {
                // Re-check after the suspension point: a chunk that raced
                // with cancellation must not be applied or emitted.
                if token.is_cancelled() {
                    return AgentEventKind::Cancelled;
                }
                aggregator.push(&chunk);
                let (reasoning_content, content) = aggregator.snapshot();
                let event = AgentEvent {
                    conversation_id: binding.conversation_id.clone(),
                    message_id: binding.message_id.clone(),
                    kind: AgentEventKind::Delta {
                        reasoning_content,
                        content,
                    },
                };
                if tx.send(event).await.is_err() {
                    // Subscriber dropped the receiver; stop consuming.
                    return AgentEventKind::Cancelled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::providers::ChunkStream;
    use crate::types::StreamChunk;

    /// Backend that replays a fixed script of chunk results.
    struct ScriptedBackend {
        script: Vec<Result<StreamChunk, ChatError>>,
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn stream_chat(&self, _request: &ChatRequest) -> Result<ChunkStream, ChatError> {
            let items = self.script.clone();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    /// Backend whose chunks are fed by the test, one at a time.
    struct GatedBackend {
        feed: std::sync::Mutex<Option<mpsc::Receiver<Result<StreamChunk, ChatError>>>>,
    }

    #[async_trait]
    impl CompletionBackend for GatedBackend {
        async fn stream_chat(&self, _request: &ChatRequest) -> Result<ChunkStream, ChatError> {
            let rx = self
                .feed
                .lock()
                .unwrap()
                .take()
                .expect("stream_chat called twice");
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            Ok(Box::pin(stream))
        }
    }

    fn binding() -> RequestBinding {
        RequestBinding {
            conversation_id: "conv-1".to_string(),
            message_id: "msg-1".to_string(),
        }
    }

    fn chat_model() -> ModelConfig {
        ModelConfig::new("deepseek-chat", false)
    }

    async fn collect(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEventKind> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.kind);
        }
        events
    }

    #[tokio::test]
    async fn test_success_emits_deltas_then_one_completed() {
        let backend = Arc::new(ScriptedBackend {
            script: vec![
                Ok(StreamChunk::answer("hel")),
                Ok(StreamChunk::answer("lo")),
            ],
        });
        let agent = ChatAgent::new(backend);
        let rx = agent.run(binding(), chat_model(), vec![], CancelToken::new());

        let events = collect(rx).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], AgentEventKind::Delta { .. }));
        match &events[2] {
            AgentEventKind::Completed {
                content,
                reasoning_content,
            } => {
                assert_eq!(content, "hello");
                assert!(reasoning_content.is_empty());
            }
            other => panic!("unexpected terminal: {:?}", other),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_reasoning_stream_aggregates_with_marker() {
        let backend = Arc::new(ScriptedBackend {
            script: vec![
                Ok(StreamChunk::reasoning("thinking...")),
                Ok(StreamChunk::reasoning("more")),
                Ok(StreamChunk::answer("42")),
            ],
        });
        let agent = ChatAgent::new(backend);
        let model = ModelConfig::new("deepseek-reasoner", true);
        let rx = agent.run(binding(), model, vec![], CancelToken::new());

        let events = collect(rx).await;
        match events.last() {
            Some(AgentEventKind::Completed {
                reasoning_content,
                content,
            }) => {
                assert_eq!(
                    reasoning_content,
                    &format!("thinking...more{}", crate::aggregator::REASONING_END_MARKER)
                );
                assert_eq!(content, "42");
            }
            other => panic!("unexpected terminal: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_error_terminates_with_failed() {
        let backend = Arc::new(ScriptedBackend {
            script: vec![
                Ok(StreamChunk::answer("partial")),
                Err(ChatError::Protocol("malformed chunk".to_string())),
            ],
        });
        let agent = ChatAgent::new(backend);
        let rx = agent.run(binding(), chat_model(), vec![], CancelToken::new());

        let events = collect(rx).await;
        assert!(matches!(
            events.last(),
            Some(AgentEventKind::Failed(ChatError::Protocol(_)))
        ));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_first_chunk_stops_consumption() {
        let (feed_tx, feed_rx) = mpsc::channel(16);
        let backend = Arc::new(GatedBackend {
            feed: std::sync::Mutex::new(Some(feed_rx)),
        });
        let agent = ChatAgent::new(backend);
        let token = CancelToken::new();
        let mut rx = agent.run(binding(), chat_model(), vec![], token.clone());

        feed_tx.send(Ok(StreamChunk::answer("chunk1"))).await.unwrap();
        let first = rx.recv().await.expect("first delta");
        match first.kind {
            AgentEventKind::Delta { ref content, .. } => assert_eq!(content, "chunk1"),
            other => panic!("unexpected: {:?}", other),
        }

        // Cancel, then let the slow transport deliver more chunks anyway.
        token.cancel("user stopped");
        feed_tx.send(Ok(StreamChunk::answer("chunk2"))).await.unwrap();
        feed_tx.send(Ok(StreamChunk::answer("chunk3"))).await.unwrap();

        let mut rest = Vec::new();
        while let Some(event) = rx.recv().await {
            rest.push(event.kind);
        }
        // No deltas after cancellation, exactly one terminal.
        assert_eq!(rest.len(), 1);
        assert!(matches!(rest[0], AgentEventKind::Cancelled));
    }

    #[tokio::test]
    async fn test_connect_failure_is_failed_terminal() {
        struct RefusingBackend;

        #[async_trait]
        impl CompletionBackend for RefusingBackend {
            async fn stream_chat(&self, _request: &ChatRequest) -> Result<ChunkStream, ChatError> {
                Err(ChatError::Network("connection refused".to_string()))
            }
        }

        let agent = ChatAgent::new(Arc::new(RefusingBackend));
        let rx = agent.run(binding(), chat_model(), vec![], CancelToken::new());

        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            AgentEventKind::Failed(ChatError::Network(_))
        ));
    }
}
