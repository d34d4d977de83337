// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! DeepSeek streaming completion backend.
//!
//! Talks to the OpenAI-compatible Chat Completions endpoint
//! (`POST {base_url}/chat/completions` with `stream: true`) and consumes the
//! SSE response incrementally, one `data:` line at a time, so a cancelled
//! request stops pulling from the socket at the next chunk boundary.
//!
//! # API Reference
//!
//! See [DeepSeek Chat Completions API](https://api-docs.deepseek.com)

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::providers::{ChunkStream, CompletionBackend};
use crate::types::{ChatRequest, StreamChunk};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Streaming client for a DeepSeek-style completion endpoint.
pub struct DeepSeekBackend {
    client: Client,
    api_key: String,
    completions_url: String,
}

impl DeepSeekBackend {
    /// Build a backend from the engine configuration.
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            completions_url: config.completions_url(),
        })
    }

    /// Map a non-2xx response to an API error, extracting the server's
    /// message when the body is the standard error envelope.
    fn error_from_response(status_code: u16, body: &str) -> ChatError {
        if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
            ChatError::api(envelope.error.message, status_code)
        } else {
            ChatError::api(body.to_string(), status_code)
        }
    }
}

#[async_trait]
impl CompletionBackend for DeepSeekBackend {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, ChatError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "opening streaming completion request"
        );

        let response = self
            .client
            .post(&self.completions_url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error_from_response(status.as_u16(), &body));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();
            'receive: while let Some(piece) = bytes.next().await {
                let piece = piece.map_err(|e| ChatError::Network(e.to_string()))?;
                buffer.extend_from_slice(&piece);

                let (chunks, done) = drain_complete_lines(&mut buffer)?;
                for chunk in chunks {
                    yield chunk;
                }
                if done {
                    break 'receive;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Drain every complete line from the raw byte buffer and parse it.
/// Returns the parsed chunks and whether the `[DONE]` terminator was seen.
///
/// The buffer holds raw bytes and only complete lines are decoded, so a
/// multibyte character split across transport pieces stays buffered until
/// its line is whole.
fn drain_complete_lines(buffer: &mut Vec<u8>) -> Result<(Vec<StreamChunk>, bool), ChatError> {
    let mut chunks = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line);
        match parse_sse_line(line.trim_end())? {
            SseLine::Chunk(chunk) => chunks.push(chunk),
            SseLine::Done => return Ok((chunks, true)),
            SseLine::Skip => {}
        }
    }
    Ok((chunks, false))
}

/// Outcome of parsing a single SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Chunk(StreamChunk),
    Done,
    Skip,
}

/// Parse one SSE line. Empty lines and comments are skipped; a malformed
/// `data:` payload is a protocol error that terminates the request.
fn parse_sse_line(line: &str) -> Result<SseLine, ChatError> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(SseLine::Skip);
    }
    let Some(data) = line.strip_prefix("data:") else {
        // Other SSE fields (event:, id:) carry nothing for this protocol.
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let parsed: SseChunk = serde_json::from_str(data)
        .map_err(|e| ChatError::Protocol(format!("malformed chunk: {}", e)))?;

    let chunk = parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.delta.into_chunk())
        .unwrap_or_default();

    Ok(SseLine::Chunk(chunk))
}

#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
}

/// Wire delta. `reasoning_content` and `reasoning` are aliases for the same
/// trace; the former wins when both are present and non-empty.
#[derive(Debug, Default, Deserialize)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl SseDelta {
    fn into_chunk(self) -> StreamChunk {
        let Self {
            content,
            reasoning_content,
            reasoning,
        } = self;
        let reasoning_delta = match reasoning_content {
            Some(text) if !text.is_empty() => Some(text),
            _ => reasoning,
        };
        StreamChunk {
            reasoning_delta,
            answer_delta: content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
