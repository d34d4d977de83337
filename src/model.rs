// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model selector: resolves which model the next request uses.
//!
//! `current_model` returns a snapshot clone; callers dispatching a request
//! must capture it once at send time and thread the captured value down
//! explicitly. Later toggles never retroactively change an in-flight
//! request's model.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::ModelConfig;

/// Switches between the base chat model and the reasoning-capable model.
#[derive(Debug)]
pub struct ModelSelector {
    chat: ModelConfig,
    reasoner: ModelConfig,
    reasoning_enabled: AtomicBool,
}

impl ModelSelector {
    /// Create a selector from the two model identifiers. Defaults to the
    /// base chat model.
    pub fn new(chat_model: impl Into<String>, reasoner_model: impl Into<String>) -> Self {
        Self {
            chat: ModelConfig::new(chat_model, false),
            reasoner: ModelConfig::new(reasoner_model, true),
            reasoning_enabled: AtomicBool::new(false),
        }
    }

    /// Switch between the base and reasoning-capable model for future sends.
    pub fn set_reasoning_enabled(&self, enabled: bool) {
        self.reasoning_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn reasoning_enabled(&self) -> bool {
        self.reasoning_enabled.load(Ordering::SeqCst)
    }

    /// The model identifier at the instant of the call.
    pub fn current_model(&self) -> ModelConfig {
        if self.reasoning_enabled() {
            self.reasoner.clone()
        } else {
            self.chat.clone()
        }
    }
}
