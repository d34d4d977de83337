// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stream aggregator: folds an ordered chunk sequence into a monotonically
//! growing `(reasoning_content, content)` pair.
//!
//! The aggregator is a pure function of the chunk sequence and the model
//! capability flag; replaying a recorded chunk log is deterministic.

use crate::types::StreamChunk;

/// Separator appended to the reasoning trace when the answer begins.
/// Appended at most once per message.
pub const REASONING_END_MARKER: &str = "\n==========  end of reasoning  ==========\n\n\n";

/// Accumulates reasoning and answer text from streamed chunks.
///
/// Final `content` equals the exact concatenation of all answer deltas
/// regardless of chunk boundaries; `reasoning_content` likewise, plus at
/// most one transition marker.
#[derive(Debug, Clone)]
pub struct StreamAggregator {
    reasoning_content: String,
    content: String,
    reasoning_capable: bool,
    marker_emitted: bool,
}

impl StreamAggregator {
    pub fn new(reasoning_capable: bool) -> Self {
        Self {
            reasoning_content: String::new(),
            content: String::new(),
            reasoning_capable,
            marker_emitted: false,
        }
    }

    /// Fold one chunk into the accumulators.
    pub fn push(&mut self, chunk: &StreamChunk) {
        let reasoning = chunk.reasoning_delta.as_deref().unwrap_or("");
        let answer = chunk.answer_delta.as_deref().unwrap_or("");

        if !reasoning.is_empty() {
            self.reasoning_content.push_str(reasoning);
        } else if !answer.is_empty()
            && self.reasoning_capable
            && !self.reasoning_content.is_empty()
            && !self.marker_emitted
        {
            self.reasoning_content.push_str(REASONING_END_MARKER);
            self.marker_emitted = true;
        }

        if !answer.is_empty() {
            self.content.push_str(answer);
        }
    }

    pub fn reasoning_content(&self) -> &str {
        &self.reasoning_content
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Current `(reasoning_content, content)` pair as owned strings.
    pub fn snapshot(&self) -> (String, String) {
        (self.reasoning_content.clone(), self.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(chunks: &[StreamChunk], reasoning_capable: bool) -> (String, String) {
        let mut agg = StreamAggregator::new(reasoning_capable);
        for chunk in chunks {
            agg.push(chunk);
        }
        agg.snapshot()
    }

    #[test]
    fn test_answer_split_invariance() {
        let whole = aggregate(&[StreamChunk::answer("the answer is 42")], false);

        let pieces = aggregate(
            &[
                StreamChunk::answer("the "),
                StreamChunk::answer("answer "),
                StreamChunk::answer("is "),
                StreamChunk::answer("4"),
                StreamChunk::answer("2"),
            ],
            false,
        );

        assert_eq!(whole, pieces);
        assert_eq!(pieces.1, "the answer is 42");
        assert!(pieces.0.is_empty());
    }

    #[test]
    fn test_reasoning_then_answer_gets_one_marker() {
        let (reasoning, content) = aggregate(
            &[
                StreamChunk::reasoning("thinking..."),
                StreamChunk::reasoning("more"),
                StreamChunk::answer("42"),
            ],
            true,
        );

        assert_eq!(
            reasoning,
            format!("thinking...more{}", REASONING_END_MARKER)
        );
        assert_eq!(content, "42");
        assert_eq!(reasoning.matches(REASONING_END_MARKER).count(), 1);
    }

    #[test]
    fn test_marker_appended_exactly_once() {
        let (reasoning, content) = aggregate(
            &[
                StreamChunk::reasoning("a"),
                StreamChunk::answer("1"),
                StreamChunk::answer("2"),
                StreamChunk::answer("3"),
            ],
            true,
        );

        assert_eq!(reasoning.matches(REASONING_END_MARKER).count(), 1);
        assert_eq!(content, "123");
    }

    #[test]
    fn test_no_marker_without_reasoning() {
        let (reasoning, content) = aggregate(&[StreamChunk::answer("hi")], true);
        assert!(reasoning.is_empty());
        assert_eq!(content, "hi");
    }

    #[test]
    fn test_no_marker_when_not_reasoning_capable() {
        // A non-reasoning model that nonetheless emitted reasoning deltas
        // accumulates them without a transition marker.
        let (reasoning, content) = aggregate(
            &[StreamChunk::reasoning("trace"), StreamChunk::answer("ok")],
            false,
        );
        assert_eq!(reasoning, "trace");
        assert_eq!(content, "ok");
    }

    #[test]
    fn test_empty_deltas_are_ignored() {
        let (reasoning, content) = aggregate(
            &[
                StreamChunk::default(),
                StreamChunk {
                    reasoning_delta: Some(String::new()),
                    answer_delta: Some(String::new()),
                },
                StreamChunk::answer("x"),
            ],
            true,
        );
        assert!(reasoning.is_empty());
        assert_eq!(content, "x");
    }

    #[test]
    fn test_replay_is_deterministic() {
        let log = vec![
            StreamChunk::reasoning("r1"),
            StreamChunk::reasoning("r2"),
            StreamChunk::answer("a1"),
            StreamChunk::answer("a2"),
        ];
        assert_eq!(aggregate(&log, true), aggregate(&log, true));
    }
}
