//! PCM audio frame types
//!
//! Everything downstream of the wrapped TTS speaks raw signed-16-bit
//! little-endian PCM at the provider's declared sample rate and channel
//! count; there is no transcoding layer.

use bytes::Bytes;

/// Bytes per sample for s16le PCM
pub const BYTES_PER_SAMPLE: usize = 2;

/// A chunk of synthesized audio.
///
/// `duration` is the provider-reported length in seconds. For frames built
/// locally from raw PCM it is derived from the byte length instead; the two
/// agree within one sample period as long as the provider honours its
/// declared fingerprint.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw s16le PCM payload
    pub data: Bytes,
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub num_channels: u32,
    /// Length of this frame in seconds
    pub duration: f64,
}

impl AudioFrame {
    /// Build a frame from raw PCM, deriving the duration from the byte length.
    pub fn from_pcm(data: Bytes, sample_rate: u32, num_channels: u32) -> Self {
        let duration = pcm_duration_secs(data.len(), sample_rate, num_channels);
        Self {
            data,
            sample_rate,
            num_channels,
            duration,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the frame carries no samples
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Seconds of audio represented by `len` bytes of s16le PCM.
///
/// Returns 0.0 for a degenerate fingerprint rather than dividing by zero.
pub fn pcm_duration_secs(len: usize, sample_rate: u32, num_channels: u32) -> f64 {
    let denom = sample_rate as usize * num_channels as usize * BYTES_PER_SAMPLE;
    if denom == 0 {
        return 0.0;
    }
    len as f64 / denom as f64
}
