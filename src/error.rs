// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the dwchat session engine.
//!
//! This module provides strongly-typed errors for each layer of the engine,
//! using `thiserror` for ergonomic error definitions and `anyhow` for
//! binary-level error propagation.

use thiserror::Error;

/// Errors that can occur while driving a streaming completion request.
#[derive(Error, Debug, Clone)]
pub enum ChatError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },
}

impl ChatError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Check if this error is a transport-level failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Errors that can occur during configuration loading.
///
/// These fail fast at session construction, never mid-stream.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(&'static str),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Errors that can occur during session operations.
///
/// `RequestInFlight` is a programming-contract violation by the caller,
/// rejected synchronously rather than surfaced as a runtime failure.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Conversation not found: {0}")]
    UnknownConversation(String),

    #[error("A request is already in flight for conversation {0}")]
    RequestInFlight(String),

    #[error("No active conversation")]
    NoActiveConversation,
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
