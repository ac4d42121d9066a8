//! Per-turn cache telemetry

use async_trait::async_trait;

/// Counters accumulated over one synthesis turn.
///
/// `cache_hits + cache_misses` may be less than `segments`: segments that
/// are not cache-eligible, and segments whose synthesis failed, count
/// toward `segments` only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnMetrics {
    pub segments: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_chars: u64,
    pub cache_miss_chars: u64,
    pub cache_hit_audio_bytes: u64,
    pub cache_miss_audio_bytes: u64,
}

impl TurnMetrics {
    /// True when the turn touched the cache at all. Empty turns are not
    /// worth a metrics POST.
    pub fn has_data(&self) -> bool {
        self.cache_hits + self.cache_misses > 0
    }
}

/// End-of-turn metrics callback.
///
/// Invoked exactly once per turn, after the synthesizer drains the segment
/// stream. Implementations must not fail the surrounding session;
/// reporting is best-effort by contract.
#[async_trait]
pub trait CacheMetricsReporter: Send + Sync {
    async fn report(&self, metrics: TurnMetrics);
}
