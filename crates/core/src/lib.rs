//! Core traits and types for the JOI voice worker
//!
//! This crate provides the foundational types used across the other crates:
//! - PCM audio frame types and duration math
//! - The `StreamingTts` trait for wrapped synthesis providers
//! - Error types

pub mod audio;
pub mod error;
pub mod traits;

pub use audio::{pcm_duration_secs, AudioFrame, BYTES_PER_SAMPLE};
pub use error::{Error, Result};
pub use traits::{AudioStream, StreamingTts};
