//! Per-session wiring for the JOI voice worker
//!
//! The hosting worker owns room lifecycle and entrypoints; this crate owns
//! what happens between a final user transcript and the last PCM byte of
//! the spoken reply.

pub mod session;

pub use session::{RoomAudioSink, SessionContext, VoiceSession};

use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("chat stream failed: {0}")]
    Chat(#[from] joi_voice_gateway::GatewayError),

    #[error("internal error: {0}")]
    Internal(String),
}
