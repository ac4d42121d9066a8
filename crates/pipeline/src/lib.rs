//! Sentence segmentation and cached TTS synthesis
//!
//! The pipeline between a token-streamed chat reply and the room's audio
//! track:
//!
//! 1. [`segmenter`] turns an unbounded delta stream into complete,
//!    utterable sentence segments with minimal buffering latency.
//! 2. [`adapter`] looks each segment up in the two-tier audio cache,
//!    synthesizes on miss, and splices everything into one monotonically
//!    timed PCM stream.
//! 3. [`emitter`] carries the resulting events to the room publisher.
//! 4. [`metrics`] accumulates per-turn hit/miss telemetry for billing.

pub mod adapter;
pub mod emitter;
pub mod metrics;
pub mod segmenter;

pub use adapter::{CachedSynthesisAdapter, SynthesisInput, SynthesisStream, TextInput};
pub use emitter::{AudioEmitter, OutputEvent, TimedTranscript, PCM_MIME_TYPE};
pub use metrics::{CacheMetricsReporter, TurnMetrics};
pub use segmenter::{
    SegmentStream, SegmenterConfig, SentenceSink, SentenceSplitter, SentenceTokenizer,
};
