// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cancellation token scoped to a single in-flight request.
//!
//! A token is minted fresh for every send. Cancellation is cooperative: the
//! agent reads the flag at each chunk receive point, so cancellation takes
//! effect at the next such check rather than instantaneously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One-way cancellation signal. Cheap to clone; all clones observe the same
/// state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to cancelled. Idempotent: only the first call records its
    /// reason, repeated calls are no-ops.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Ok(mut slot) = self.inner.reason.lock() {
                *slot = Some(reason.into());
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Reason recorded by the first `cancel` call, if any.
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().ok().and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_is_active() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn test_cancel_is_one_way() {
        let token = CancelToken::new();
        token.cancel("user stopped");
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("user stopped".to_string()));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel("first");
        token.cancel("second");
        assert!(token.is_cancelled());
        // Repeated calls do not overwrite the original reason.
        assert_eq!(token.reason(), Some("first".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let observer = token.clone();
        token.cancel("stop");
        assert!(observer.is_cancelled());
    }
}
