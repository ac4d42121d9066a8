//! Sentence segmenter for streaming LLM output
//!
//! Buffers reply deltas and emits complete sentences for synthesis as soon
//! as they are complete. A sentence boundary is a terminator character,
//! optionally followed by closing quotes or brackets, followed by
//! whitespace. Holding out for that one trailing character keeps decimal
//! points and abbreviation-internal periods from splitting sentences, at
//! the cost of at most one delta of lookahead.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Sentence terminators
const TERMINATORS: &[char] = &['.', '!', '?', '…'];

/// Characters that may trail a terminator and still belong to the sentence
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{201d}', '\u{2019}', '」'];

/// Segmenter configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Maximum characters to buffer before forcing a word-boundary break
    pub max_buffer_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_buffer_chars: 500,
        }
    }
}

/// Incremental sentence boundary scanner.
///
/// Holds at most one unfinished sentence; completed sentences are returned
/// trimmed and non-empty, in input order.
pub struct SentenceSplitter {
    config: SegmenterConfig,
    buffer: String,
}

impl SentenceSplitter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
        }
    }

    /// Append a delta and return any sentences it completed.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut sentences = self.extract_complete();

        // Force a break at the last word boundary if the tail has grown
        // past the buffer cap without reaching a terminator.
        if self.buffer.chars().count() > self.config.max_buffer_chars {
            if let Some(pos) = self.buffer.rfind(char::is_whitespace) {
                let partial = self.buffer[..pos].trim().to_string();
                self.buffer = self.buffer[pos..].to_string();
                if !partial.is_empty() {
                    sentences.push(partial);
                }
            }
        }

        sentences
    }

    /// Emit the buffered tail, if any, as a final partial sentence.
    pub fn flush(&mut self) -> Option<String> {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        (!text.is_empty()).then_some(text)
    }

    /// Scan the buffer for completed sentences and retain the remainder.
    fn extract_complete(&mut self) -> Vec<String> {
        let chars: Vec<char> = self.buffer.chars().collect();
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            if !TERMINATORS.contains(&chars[i]) {
                i += 1;
                continue;
            }

            // Attach any closing quotes/brackets to the sentence.
            let mut end = i + 1;
            while end < chars.len() && CLOSERS.contains(&chars[end]) {
                end += 1;
            }

            if end >= chars.len() {
                // Boundary not confirmed yet; wait for the next delta
                // (or a flush) to see what follows.
                break;
            }

            if !chars[end].is_whitespace() {
                // Mid-token punctuation ("3.14", "v1.2"), keep scanning.
                i = end;
                continue;
            }

            let sentence: String = chars[start..end].iter().collect();
            let sentence = sentence.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }

            // Swallow the whitespace run separating sentences.
            while end < chars.len() && chars[end].is_whitespace() {
                end += 1;
            }
            start = end;
            i = end;
        }

        if start > 0 {
            self.buffer = chars[start..].iter().collect();
        }
        sentences
    }
}

/// Factory for per-turn sentence streams.
#[derive(Debug, Clone, Default)]
pub struct SentenceTokenizer {
    config: SegmenterConfig,
}

impl SentenceTokenizer {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Open a new tokenizer stream: a sink half the input forwarder pushes
    /// deltas into, and a stream half yielding completed segments.
    pub fn stream(&self) -> (SentenceSink, SegmentStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SentenceSink {
                splitter: SentenceSplitter::new(self.config.clone()),
                tx,
            },
            SegmentStream { rx },
        )
    }
}

/// Input half of a tokenizer stream.
pub struct SentenceSink {
    splitter: SentenceSplitter,
    tx: mpsc::UnboundedSender<String>,
}

impl SentenceSink {
    /// Push a text delta; completed sentences are forwarded immediately.
    pub fn push_text(&mut self, delta: &str) {
        for sentence in self.splitter.push(delta) {
            let _ = self.tx.send(sentence);
        }
    }

    /// Emit the buffered tail as a segment without waiting for a terminator.
    pub fn flush(&mut self) {
        if let Some(tail) = self.splitter.flush() {
            let _ = self.tx.send(tail);
        }
    }

    /// Flush the tail and close the stream; no segments are produced after
    /// this returns.
    pub fn end_input(mut self) {
        self.flush();
        // Dropping the sender ends the stream.
    }
}

/// Output half of a tokenizer stream.
pub struct SegmentStream {
    rx: mpsc::UnboundedReceiver<String>,
}

impl SegmentStream {
    /// Next completed segment, or `None` after `end_input`.
    pub async fn next_segment(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for SegmentStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}
