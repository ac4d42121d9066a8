//! Voice-mode text shaping
//!
//! Reply deltas carry artifacts that should never reach the TTS engine:
//! bracketed stage markers the model sometimes emits despite instructions,
//! and spellings the engine mispronounces. Both filters are streaming-safe.

use once_cell::sync::Lazy;
use regex::Regex;

use joi_voice_config::{PronunciationRule, TtsSettings};

static VOICE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[[a-z][a-z0-9_-]{0,20}\]\s*").expect("valid marker pattern"));

/// Characters a pronunciation rewrite can safely stop at.
const WORD_BOUNDARIES: &[char] = &[' ', '\n', '\t', '.', ',', '!', '?', ';', ':', ')', ']', '}'];

/// Remove bracketed stage/emotion markers (e.g. `[happy]`, `[thinking]`).
pub fn strip_voice_markers(text: &str) -> String {
    VOICE_MARKER_RE.replace_all(text, "").into_owned()
}

/// Streaming pronunciation replacer.
///
/// Buffers deltas until a word boundary so a rule never matches half a
/// word split across two chunks. `flush` drains whatever remains at end
/// of stream.
pub struct PronunciationReplacer {
    patterns: Vec<(Regex, String)>,
    buffer: String,
}

impl PronunciationReplacer {
    pub fn new(rules: &[PronunciationRule]) -> Self {
        let patterns = rules
            .iter()
            .filter_map(|rule| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(&rule.word));
                match Regex::new(&pattern) {
                    Ok(re) => Some((re, rule.replacement.clone())),
                    Err(e) => {
                        tracing::warn!(word = %rule.word, error = %e, "Skipping pronunciation rule");
                        None
                    }
                }
            })
            .collect();
        Self {
            patterns,
            buffer: String::new(),
        }
    }

    /// Append a delta; returns the rewritten text up to the last word
    /// boundary, or an empty string while a word is still incomplete.
    pub fn push(&mut self, delta: &str) -> String {
        if self.patterns.is_empty() {
            return delta.to_string();
        }
        self.buffer.push_str(delta);

        let Some(boundary) = self.buffer.rfind(WORD_BOUNDARIES) else {
            return String::new();
        };
        let rest = self.buffer.split_off(boundary + 1);
        let flushed = std::mem::replace(&mut self.buffer, rest);
        self.apply(&flushed)
    }

    /// Rewrite and return whatever is still buffered.
    pub fn flush(&mut self) -> String {
        if self.buffer.is_empty() {
            return String::new();
        }
        let text = std::mem::take(&mut self.buffer);
        self.apply(&text)
    }

    fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (pattern, replacement) in &self.patterns {
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
        out
    }
}

/// Build the voice-mode system prompt suffix sent with each chat request.
pub fn build_voice_prompt(tts: &TtsSettings) -> String {
    let mut parts = Vec::new();

    if !tts.voice_prompt.is_empty() {
        parts.push(tts.voice_prompt.clone());
    }

    if !tts.pronunciations.is_empty() {
        let guides = tts
            .pronunciations
            .iter()
            .map(|r| format!("- \"{}\" → write as \"{}\"", r.word, r.replacement))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!(
            "## Pronunciation Guide\n\
             When speaking, use these exact spellings so the text-to-speech \
             engine pronounces them correctly:\n{guides}"
        ));
    }

    parts.push(
        "## Voice Style\n\
         Speak naturally and clearly. Never output bracketed markers like \
         [happy] or [thinking]. Avoid repetitive time-based greetings and \
         avoid repeatedly saying the user's name."
            .to_string(),
    );

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<PronunciationRule> {
        vec![PronunciationRule {
            word: "JOI".to_string(),
            replacement: "joy".to_string(),
        }]
    }

    #[test]
    fn strips_markers() {
        assert_eq!(strip_voice_markers("[happy] Hello there"), "Hello there");
        assert_eq!(strip_voice_markers("Hi [thinking] there"), "Hi there");
        assert_eq!(strip_voice_markers("plain text"), "plain text");
        // A bracketed expression that is not a marker survives.
        assert_eq!(strip_voice_markers("list[0]"), "list[0]");
    }

    #[test]
    fn replaces_whole_words_only() {
        let mut replacer = PronunciationReplacer::new(&rules());
        let out = replacer.push("ask JOI about JOIful things ");
        assert_eq!(out, "ask joy about JOIful things ");
    }

    #[test]
    fn buffers_until_word_boundary() {
        let mut replacer = PronunciationReplacer::new(&rules());
        // "JO" alone could be the start of "JOI"; it stays buffered.
        assert_eq!(replacer.push("talk to JO"), "talk to ");
        // The next delta completes the word and a boundary releases it.
        assert_eq!(replacer.push("I now"), "joy ");
        assert_eq!(replacer.flush(), "now");
    }

    #[test]
    fn no_rules_passes_through() {
        let mut replacer = PronunciationReplacer::new(&[]);
        assert_eq!(replacer.push("anything at all"), "anything at all");
        assert_eq!(replacer.flush(), "");
    }

    #[test]
    fn flush_is_idempotent() {
        let mut replacer = PronunciationReplacer::new(&rules());
        replacer.push("JOI");
        assert_eq!(replacer.flush(), "joy");
        assert_eq!(replacer.flush(), "");
    }

    #[test]
    fn voice_prompt_includes_guide_and_style() {
        let tts = TtsSettings {
            voice_prompt: "Be brief.".to_string(),
            pronunciations: rules(),
            ..Default::default()
        };
        let prompt = build_voice_prompt(&tts);
        assert!(prompt.starts_with("Be brief."));
        assert!(prompt.contains("## Pronunciation Guide"));
        assert!(prompt.contains("\"JOI\" → write as \"joy\""));
        assert!(prompt.contains("## Voice Style"));
    }

    #[test]
    fn voice_prompt_minimal() {
        let prompt = build_voice_prompt(&TtsSettings::default());
        assert!(prompt.starts_with("## Voice Style"));
        assert!(!prompt.contains("Pronunciation Guide"));
    }
}
