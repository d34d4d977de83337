// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for the dwchat session engine.
//!
//! Construction fails fast with [`ConfigError`] when the API credential is
//! missing; nothing is re-validated mid-stream.

use crate::error::ConfigError;

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Environment variable overriding the endpoint base URL.
pub const BASE_URL_ENV: &str = "DEEPSEEK_BASE_URL";

/// Default DeepSeek API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Base chat model identifier.
pub const MODEL_CHAT: &str = "deepseek-chat";

/// Reasoning-capable model identifier.
pub const MODEL_REASONER: &str = "deepseek-reasoner";

/// Engine configuration: credential, endpoint, and the model pair.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// API credential sent as a bearer token.
    pub api_key: String,
    /// Endpoint base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Base chat model.
    pub chat_model: String,
    /// Reasoning-capable model.
    pub reasoner_model: String,
    /// Request timeout in milliseconds (transport concern; a timeout
    /// surfaces as a network error on the affected request).
    pub timeout_ms: Option<u64>,
}

impl ChatConfig {
    /// Create a configuration with explicit credential and endpoint.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            chat_model: MODEL_CHAT.to_string(),
            reasoner_model: MODEL_REASONER.to_string(),
            timeout_ms: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment.
    ///
    /// `DEEPSEEK_API_KEY` is required; `DEEPSEEK_BASE_URL` falls back to the
    /// public endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key =
            std::env::var(API_KEY_ENV).map_err(|_| ConfigError::MissingApiKey(API_KEY_ENV))?;
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url)
    }

    /// Override the endpoint base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey(API_KEY_ENV));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }

    /// Full URL of the streaming completion endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = ChatConfig::new("sk-test", DEFAULT_BASE_URL).unwrap();
        assert_eq!(config.chat_model, "deepseek-chat");
        assert_eq!(config.reasoner_model, "deepseek-reasoner");
        assert_eq!(
            config.completions_url(),
            "https://api.deepseek.com/chat/completions"
        );
    }

    #[test]
    fn test_config_empty_key_rejected() {
        let result = ChatConfig::new("  ", DEFAULT_BASE_URL);
        assert!(matches!(result, Err(ConfigError::MissingApiKey(_))));
    }

    #[test]
    fn test_config_invalid_base_url_rejected() {
        let result = ChatConfig::new("sk-test", "api.deepseek.com");
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_completions_url_trailing_slash() {
        let config = ChatConfig::new("sk-test", "https://example.com/v1/").unwrap();
        assert_eq!(
            config.completions_url(),
            "https://example.com/v1/chat/completions"
        );
    }
}
