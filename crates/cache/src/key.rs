//! Cache key derivation
//!
//! Keys must be byte-identical across processes and language runtimes, so
//! the payload is serialized as canonical JSON: mapping keys sorted
//! lexicographically, non-ASCII characters `\uXXXX`-escaped, no separator
//! whitespace. The digest is SHA-256, rendered as lowercase hex.

use sha2::{Digest, Sha256};

use joi_voice_config::TtsCacheSettings;

/// Attributes identifying a unique TTS rendering configuration.
///
/// Two segments with equal normalized text but different fingerprints must
/// never share a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsFingerprint {
    pub provider: String,
    pub model: String,
    pub voice: String,
    pub sample_rate: u32,
    pub num_channels: u32,
}

impl TtsFingerprint {
    /// Canonical JSON object for this fingerprint, keys in sorted order.
    fn canonical_json(&self) -> String {
        let mut out = String::with_capacity(96);
        out.push_str("{\"model\":");
        push_json_string(&mut out, &self.model);
        out.push_str(",\"num_channels\":");
        out.push_str(&self.num_channels.to_string());
        out.push_str(",\"provider\":");
        push_json_string(&mut out, &self.provider);
        out.push_str(",\"sample_rate\":");
        out.push_str(&self.sample_rate.to_string());
        out.push_str(",\"voice\":");
        push_json_string(&mut out, &self.voice);
        out.push('}');
        out
    }
}

/// Collapse whitespace runs to a single space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build `<prefix>:<64-lowercase-hex>` for a segment and fingerprint.
pub fn build_cache_key(prefix: &str, text: &str, fingerprint: &TtsFingerprint) -> String {
    let mut payload = String::with_capacity(160);
    payload.push_str("{\"fp\":");
    payload.push_str(&fingerprint.canonical_json());
    payload.push_str(",\"text\":");
    push_json_string(&mut payload, &normalize_text(text));
    payload.push('}');

    let digest = Sha256::digest(payload.as_bytes());
    format!("{}:{}", prefix, hex::encode(digest))
}

/// JSON string literal with ASCII-only output.
///
/// Characters outside the printable ASCII range are escaped as `\uXXXX`
/// (surrogate pairs above the BMP), matching canonical serializers in other
/// runtimes byte for byte.
fn push_json_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{0c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            c if (' '..='~').contains(&c) => out.push(c),
            c => {
                let cp = c as u32;
                if cp <= 0xFFFF {
                    out.push_str(&format!("\\u{:04x}", cp));
                } else {
                    let v = cp - 0x10000;
                    let high = 0xD800 + (v >> 10);
                    let low = 0xDC00 + (v & 0x3FF);
                    out.push_str(&format!("\\u{:04x}\\u{:04x}", high, low));
                }
            }
        }
    }
    out.push('"');
}

/// Key-derivation and eligibility knobs shared by the adapter and facade.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Key prefix, e.g. `joi:tts:v1`
    pub prefix: String,
    /// Eligibility cap on normalized segment length, in characters
    pub max_text_chars: usize,
    /// Eligibility cap on a cached PCM payload, in bytes
    pub max_audio_bytes: usize,
}

impl CachePolicy {
    pub fn from_settings(settings: &TtsCacheSettings) -> Self {
        Self {
            prefix: settings.prefix.clone(),
            max_text_chars: settings.max_text_chars,
            max_audio_bytes: settings.max_audio_bytes,
        }
    }

    /// A segment is cacheable when its normalized text is non-empty and at
    /// most `max_text_chars` characters. Long one-off sentences rarely recur
    /// and would only pollute the cache.
    pub fn is_cacheable(&self, text: &str) -> bool {
        let normalized = normalize_text(text);
        !normalized.is_empty() && normalized.chars().count() <= self.max_text_chars
    }

    /// Cache key for a segment under this policy's prefix.
    pub fn key(&self, text: &str, fingerprint: &TtsFingerprint) -> String {
        build_cache_key(&self.prefix, text, fingerprint)
    }
}
