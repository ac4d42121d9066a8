//! Trait boundaries to external collaborators

pub mod speech;

pub use speech::{AudioStream, StreamingTts};
