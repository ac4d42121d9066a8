//! Shared error types

use thiserror::Error;

/// Errors surfaced by the worker's core components.
///
/// Cache faults never appear here: both cache tiers are best-effort and
/// degrade to absent/no-op internally.
#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure talking to the gateway or a provider
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be decoded (SSE frame, JSON body)
    #[error("decode error: {0}")]
    Decode(String),

    /// The wrapped TTS provider failed to synthesize a segment
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// A channel endpoint hung up mid-turn
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// The surrounding scope was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias used across the worker crates
pub type Result<T> = std::result::Result<T, Error>;
