//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main worker settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Gateway endpoints and timeouts
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Wrapped TTS provider identity
    #[serde(default)]
    pub tts: TtsSettings,

    /// TTS sentence-cache engine
    #[serde(default)]
    pub cache: TtsCacheSettings,
}

/// Gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Base URL of the JOI gateway
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Connect-phase timeout for the chat SSE call, seconds
    #[serde(default = "default_connect_timeout_sec")]
    pub connect_timeout_sec: f64,

    /// Read timeout between SSE chunks, seconds
    #[serde(default = "default_read_timeout_sec")]
    pub read_timeout_sec: f64,

    /// Attempts for a chat call that fails before the first chunk
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step between attempts, seconds
    #[serde(default = "default_backoff_step_sec")]
    pub backoff_step_sec: f64,
}

fn default_gateway_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_connect_timeout_sec() -> f64 {
    6.0
}

fn default_read_timeout_sec() -> f64 {
    90.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_step_sec() -> f64 {
    0.3
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            connect_timeout_sec: default_connect_timeout_sec(),
            read_timeout_sec: default_read_timeout_sec(),
            max_attempts: default_max_attempts(),
            backoff_step_sec: default_backoff_step_sec(),
        }
    }
}

/// Wrapped TTS provider identity and voice-mode text shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    /// Provider name used in cache fingerprints and telemetry
    #[serde(default = "default_tts_provider")]
    pub provider: String,

    /// Provider model id
    #[serde(default = "default_tts_model")]
    pub model: String,

    /// Voice id, empty for the provider default
    #[serde(default)]
    pub voice: String,

    /// Extra system-prompt text for voice mode
    #[serde(default)]
    pub voice_prompt: String,

    /// Spelling substitutions applied to the reply stream before synthesis
    #[serde(default)]
    pub pronunciations: Vec<PronunciationRule>,
}

fn default_tts_provider() -> String {
    "cartesia".to_string()
}

fn default_tts_model() -> String {
    "sonic-2".to_string()
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            model: default_tts_model(),
            voice: String::new(),
            voice_prompt: String::new(),
            pronunciations: Vec::new(),
        }
    }
}

/// One pronunciation substitution rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PronunciationRule {
    /// Word to replace (matched on word boundaries, case-insensitive)
    pub word: String,
    /// Spelling the TTS engine pronounces correctly
    pub replacement: String,
}

/// Settings for the two-tier TTS audio cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsCacheSettings {
    /// Bypass the cached adapter entirely when false
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Upper bound on local entries; zero disables the local tier
    #[serde(default = "default_local_max_items")]
    pub local_max_items: usize,

    /// Upper bound on total local PCM bytes
    #[serde(default = "default_local_max_bytes")]
    pub local_max_bytes: usize,

    /// Eligibility cap on normalized segment length, characters
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Eligibility cap on a cached PCM payload, bytes
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: usize,

    /// TTL for remote entries, seconds
    #[serde(default = "default_redis_ttl_sec")]
    pub redis_ttl_sec: u64,

    /// Cache key prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Remote backend endpoint; empty disables the remote tier
    #[serde(default)]
    pub redis_url: String,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_local_max_items() -> usize {
    512
}

fn default_local_max_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_text_chars() -> usize {
    280
}

fn default_max_audio_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_redis_ttl_sec() -> u64 {
    604_800 // 7 days
}

fn default_prefix() -> String {
    "joi:tts:v1".to_string()
}

impl Default for TtsCacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            local_max_items: default_local_max_items(),
            local_max_bytes: default_local_max_bytes(),
            max_text_chars: default_max_text_chars(),
            max_audio_bytes: default_max_audio_bytes(),
            redis_ttl_sec: default_redis_ttl_sec(),
            prefix: default_prefix(),
            redis_url: String::new(),
        }
    }
}

impl TtsCacheSettings {
    // Minimums below which a value is treated as a misconfiguration
    const MIN_LOCAL_MAX_BYTES: usize = 1024 * 1024;
    const MIN_MAX_TEXT_CHARS: usize = 32;
    const MIN_MAX_AUDIO_BYTES: usize = 16_384;
    const MIN_REDIS_TTL_SEC: u64 = 60;

    /// Clamp out-of-range values back to their defaults, warning once per
    /// field. Never fails: a bad cache knob must not take the worker down.
    pub fn normalize(&mut self) {
        if self.local_max_bytes < Self::MIN_LOCAL_MAX_BYTES {
            tracing::warn!(
                value = self.local_max_bytes,
                minimum = Self::MIN_LOCAL_MAX_BYTES,
                "cache.local_max_bytes below minimum; using default"
            );
            self.local_max_bytes = default_local_max_bytes();
        }
        if self.max_text_chars < Self::MIN_MAX_TEXT_CHARS {
            tracing::warn!(
                value = self.max_text_chars,
                minimum = Self::MIN_MAX_TEXT_CHARS,
                "cache.max_text_chars below minimum; using default"
            );
            self.max_text_chars = default_max_text_chars();
        }
        if self.max_audio_bytes < Self::MIN_MAX_AUDIO_BYTES {
            tracing::warn!(
                value = self.max_audio_bytes,
                minimum = Self::MIN_MAX_AUDIO_BYTES,
                "cache.max_audio_bytes below minimum; using default"
            );
            self.max_audio_bytes = default_max_audio_bytes();
        }
        if self.redis_ttl_sec < Self::MIN_REDIS_TTL_SEC {
            tracing::warn!(
                value = self.redis_ttl_sec,
                minimum = Self::MIN_REDIS_TTL_SEC,
                "cache.redis_ttl_sec below minimum; using default"
            );
            self.redis_ttl_sec = default_redis_ttl_sec();
        }
        if self.prefix.trim().is_empty() {
            tracing::warn!("cache.prefix is empty; using default");
            self.prefix = default_prefix();
        }
    }

    /// True when a remote tier is configured
    pub fn remote_configured(&self) -> bool {
        !self.redis_url.trim().is_empty()
    }
}

impl Settings {
    /// Validate cross-field constraints that cannot be clamped away.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "gateway.url".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.gateway.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gateway.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from files and environment.
///
/// Priority: env vars > `config/{env}.yaml` > `config/default.yaml` > defaults.
/// Integer and float fields tolerate string values (`try_parsing`). A file or
/// environment layer that fails to parse falls back to defaults with a
/// warning rather than failing the worker.
pub fn load_settings(env: Option<&str>) -> Settings {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(Environment::with_prefix("JOI").separator("__").try_parsing(true));

    let mut settings = match builder.build().and_then(|c| c.try_deserialize::<Settings>()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load configuration; using defaults");
            Settings::default()
        }
    };

    settings.cache.normalize();

    if let Err(e) = settings.validate() {
        tracing::warn!(error = %e, "Invalid configuration; using defaults");
        settings = Settings::default();
        settings.cache.normalize();
    }

    settings
}
