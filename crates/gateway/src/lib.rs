//! JOI gateway client
//!
//! The worker delegates its LLM turns to the gateway and reports usage
//! back to it:
//! - [`chat`]: `POST /api/voice/chat`, an SSE stream of reply deltas
//! - [`usage`]: fire-and-forget usage and cache-metrics POSTs
//! - [`pending`]: FIFO pairing of finished LLM turns with their metrics
//! - [`text`]: voice-mode filters applied to the reply stream

pub mod chat;
pub mod pending;
pub mod text;
pub mod usage;

pub use chat::{
    ChatBackend, ChatClient, ChatOutcome, ChatRequest, FALLBACK_CONNECT, FALLBACK_ERROR,
};
pub use pending::{PendingTurn, PendingTurnQueue};
pub use text::{build_voice_prompt, strip_voice_markers, PronunciationReplacer};
pub use usage::{CacheMetricsReport, UsageReporter, VoiceUsageReport};

use thiserror::Error;

/// Gateway client errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}
