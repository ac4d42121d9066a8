//! Usage and cache-metrics sinks
//!
//! Fire-and-forget POSTs to the gateway for cost tracking and cache
//! observability. Short timeouts, no retries: a lost metrics document is
//! cheaper than a stalled voice turn. Non-2xx responses are logged and
//! discarded.

use std::time::Duration;

use serde::Serialize;

use joi_voice_pipeline::TurnMetrics;

use crate::GatewayError;

const TOTAL_TIMEOUT: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(400);

/// STT/TTS usage for one provider call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUsageReport {
    pub conversation_id: String,
    pub agent_id: String,
    pub provider: String,
    pub service: String,
    pub model: String,
    pub duration_ms: u64,
    pub characters: u64,
}

/// One turn's cache telemetry, bound to the message it spoke.
#[derive(Debug, Clone)]
pub struct CacheMetricsReport {
    pub conversation_id: String,
    pub agent_id: String,
    pub message_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub voice: String,
    pub metrics: TurnMetrics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMetrics {
    segments: u64,
    cache_hits: u64,
    cache_misses: u64,
    cache_hit_chars: u64,
    cache_miss_chars: u64,
    cache_hit_audio_bytes: u64,
    cache_miss_audio_bytes: u64,
}

impl From<TurnMetrics> for WireMetrics {
    fn from(m: TurnMetrics) -> Self {
        Self {
            segments: m.segments,
            cache_hits: m.cache_hits,
            cache_misses: m.cache_misses,
            cache_hit_chars: m.cache_hit_chars,
            cache_miss_chars: m.cache_miss_chars,
            cache_hit_audio_bytes: m.cache_hit_audio_bytes,
            cache_miss_audio_bytes: m.cache_miss_audio_bytes,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireCacheReport<'a> {
    conversation_id: &'a str,
    agent_id: &'a str,
    message_id: Option<&'a str>,
    provider: &'a str,
    model: &'a str,
    voice: &'a str,
    metrics: WireMetrics,
}

/// Gateway metrics sink.
pub struct UsageReporter {
    http: reqwest::Client,
    base_url: String,
}

impl UsageReporter {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// POST `/api/voice/usage`. Never fails the caller.
    pub async fn post_usage(&self, report: VoiceUsageReport) {
        let url = format!("{}/api/voice/usage", self.base_url);
        match self.http.post(&url).json(&report).send().await {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(status, body = %body, "voice/usage failed");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed posting voice usage"),
        }
    }

    /// POST `/api/voice/cache-metrics`. Turns that never touched the cache
    /// are suppressed entirely.
    pub async fn post_cache_metrics(&self, report: CacheMetricsReport) {
        if !report.metrics.has_data() {
            return;
        }
        let payload = WireCacheReport {
            conversation_id: &report.conversation_id,
            agent_id: &report.agent_id,
            message_id: report.message_id.as_deref(),
            provider: &report.provider,
            model: &report.model,
            voice: &report.voice,
            metrics: report.metrics.into(),
        };
        let url = format!("{}/api/voice/cache-metrics", self.base_url);
        match self.http.post(&url).json(&payload).send().await {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(status, body = %body, "voice/cache-metrics failed");
            }
            Ok(_) => {
                tracing::info!(
                    hits = report.metrics.cache_hits,
                    misses = report.metrics.cache_misses,
                    hit_chars = report.metrics.cache_hit_chars,
                    miss_chars = report.metrics.cache_miss_chars,
                    "Voice cache metrics posted"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Failed posting voice cache metrics"),
        }
    }
}
