//! Speech synthesis trait

use crate::{AudioFrame, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of synthesized audio frames from one synthesis call
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<AudioFrame>> + Send>>;

/// Streaming text-to-speech provider.
///
/// This is the boundary to the wrapped provider (Cartesia in production).
/// Implementations own their network connection and credentials; the
/// cached synthesis adapter only needs the declared PCM shape and a
/// one-shot synthesis call per sentence segment.
///
/// # Example
///
/// ```ignore
/// let tts: Arc<dyn StreamingTts> = Arc::new(CartesiaTts::new(config));
/// let mut frames = tts.synthesize("Hello there.").await?;
/// while let Some(frame) = frames.next().await {
///     publish(frame?);
/// }
/// ```
#[async_trait]
pub trait StreamingTts: Send + Sync + 'static {
    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Output channel count
    fn num_channels(&self) -> u32;

    /// Synthesize one segment of text.
    ///
    /// One-shot: the caller does not retry a failed call, it skips the
    /// segment and moves on. Frames must be s16le PCM at the declared
    /// sample rate and channel count.
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}
