//! Cached synthesis adapter
//!
//! Sits between the gateway's token-streamed reply and the wrapped TTS
//! provider. Reply deltas go in; a single monotonically timed PCM stream
//! comes out. Each complete sentence is looked up in the two-tier audio
//! cache first; hits bypass the provider entirely, misses are synthesized
//! once and the full-segment PCM is stored back after success.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use joi_voice_cache::{CachePolicy, TtsFingerprint, TwoTierAudioCache};
use joi_voice_core::{pcm_duration_secs, StreamingTts};

use crate::emitter::{AudioEmitter, OutputEvent};
use crate::metrics::{CacheMetricsReporter, TurnMetrics};
use crate::segmenter::{SegmentStream, SegmenterConfig, SentenceSink, SentenceTokenizer};

/// Items accepted on a synthesis stream's input channel.
#[derive(Debug, Clone)]
pub enum TextInput {
    /// A reply delta from the chat stream
    Delta(String),
    /// Force the buffered tail out as a segment
    Flush,
}

/// Streaming TTS wrapper with a two-tier sentence cache.
///
/// Exposes the wrapped provider's PCM shape; `stream()` opens one turn.
pub struct CachedSynthesisAdapter {
    wrapped: Arc<dyn StreamingTts>,
    cache: Arc<TwoTierAudioCache>,
    policy: CachePolicy,
    fingerprint: TtsFingerprint,
    tokenizer: SentenceTokenizer,
    reporter: Option<Arc<dyn CacheMetricsReporter>>,
}

impl CachedSynthesisAdapter {
    pub fn new(
        wrapped: Arc<dyn StreamingTts>,
        cache: Arc<TwoTierAudioCache>,
        policy: CachePolicy,
        fingerprint: TtsFingerprint,
    ) -> Self {
        Self {
            wrapped,
            cache,
            policy,
            fingerprint,
            tokenizer: SentenceTokenizer::default(),
            reporter: None,
        }
    }

    /// Attach the end-of-turn metrics callback.
    pub fn with_reporter(mut self, reporter: Arc<dyn CacheMetricsReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Override the segmenter configuration.
    pub fn with_segmenter_config(mut self, config: SegmenterConfig) -> Self {
        self.tokenizer = SentenceTokenizer::new(config);
        self
    }

    /// Sample rate of the wrapped provider
    pub fn sample_rate(&self) -> u32 {
        self.wrapped.sample_rate()
    }

    /// Channel count of the wrapped provider
    pub fn num_channels(&self) -> u32 {
        self.wrapped.num_channels()
    }

    /// Open a synthesis stream for one turn.
    ///
    /// The turn runs on a driver task hosting two cooperating halves: an
    /// input forwarder feeding the sentence tokenizer, and a synthesizer
    /// executing the per-segment protocol. Closing the input (dropping the
    /// [`SynthesisInput`]) ends the turn; the metrics callback fires once
    /// the synthesizer drains the final segment.
    pub fn stream(&self) -> SynthesisStream {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (emitter, events) = AudioEmitter::channel();
        let (sink, segments) = self.tokenizer.stream();

        let turn = Turn {
            wrapped: Arc::clone(&self.wrapped),
            cache: Arc::clone(&self.cache),
            policy: self.policy.clone(),
            fingerprint: self.fingerprint.clone(),
            reporter: self.reporter.clone(),
        };
        let driver = tokio::spawn(turn.run(input_rx, sink, segments, emitter));

        SynthesisStream {
            input: Some(SynthesisInput { tx: input_tx }),
            events,
            driver,
        }
    }
}

/// Handle for pushing text into an open turn. Dropping every clone closes
/// the input channel and ends the turn.
#[derive(Clone)]
pub struct SynthesisInput {
    tx: mpsc::UnboundedSender<TextInput>,
}

impl SynthesisInput {
    pub fn push_delta(&self, delta: impl Into<String>) {
        let _ = self.tx.send(TextInput::Delta(delta.into()));
    }

    pub fn flush(&self) {
        let _ = self.tx.send(TextInput::Flush);
    }
}

/// One open synthesis turn.
pub struct SynthesisStream {
    input: Option<SynthesisInput>,
    events: mpsc::UnboundedReceiver<OutputEvent>,
    driver: JoinHandle<()>,
}

impl SynthesisStream {
    /// Take the input handle. Returns `None` if already taken.
    pub fn take_input(&mut self) -> Option<SynthesisInput> {
        self.input.take()
    }

    /// Next output event, or `None` once the turn has fully drained.
    pub async fn next_event(&mut self) -> Option<OutputEvent> {
        self.events.recv().await
    }

    /// Close the input (if still held) and wait for the driver to finish.
    pub async fn shutdown(mut self) {
        self.input.take();
        while self.events.recv().await.is_some() {}
        let _ = (&mut self.driver).await;
    }

    /// Cancel the turn: the driver task is aborted, which drops the
    /// tokenizer stream and any in-flight provider call.
    pub fn abort(&self) {
        self.driver.abort();
    }
}

/// Per-turn state moved onto the driver task.
struct Turn {
    wrapped: Arc<dyn StreamingTts>,
    cache: Arc<TwoTierAudioCache>,
    policy: CachePolicy,
    fingerprint: TtsFingerprint,
    reporter: Option<Arc<dyn CacheMetricsReporter>>,
}

impl Turn {
    async fn run(
        self,
        mut input: mpsc::UnboundedReceiver<TextInput>,
        mut sink: SentenceSink,
        mut segments: SegmentStream,
        emitter: AudioEmitter,
    ) {
        let request_id = Uuid::new_v4().to_string();
        emitter.initialize(
            request_id,
            self.wrapped.sample_rate(),
            self.wrapped.num_channels(),
        );
        emitter.start_segment(Uuid::new_v4().to_string());

        let forward_input = async {
            while let Some(item) = input.recv().await {
                match item {
                    TextInput::Delta(delta) => sink.push_text(&delta),
                    TextInput::Flush => sink.flush(),
                }
            }
            sink.end_input();
        };

        let synthesize = async {
            let mut duration = 0.0_f64;
            let mut metrics = TurnMetrics::default();
            while let Some(token) = segments.next_segment().await {
                self.synthesize_segment(&token, &emitter, &mut duration, &mut metrics)
                    .await;
            }
            metrics
        };

        let ((), metrics) = tokio::join!(forward_input, synthesize);

        if let Some(reporter) = &self.reporter {
            reporter.report(metrics).await;
        }
    }

    /// The per-segment synthesis protocol.
    async fn synthesize_segment(
        &self,
        token: &str,
        emitter: &AudioEmitter,
        duration: &mut f64,
        metrics: &mut TurnMetrics,
    ) {
        emitter.push_timed_transcript(token, *duration);

        let text = token.trim();
        if text.is_empty() {
            return;
        }
        let chars = text.chars().count() as u64;

        metrics.segments += 1;
        let eligible = self.policy.is_cacheable(text);
        let key = self.policy.key(text, &self.fingerprint);

        if eligible {
            if let Some(hit) = self.cache.get(&key).await {
                emitter.push(hit.pcm.clone());
                *duration += pcm_duration_secs(
                    hit.pcm.len(),
                    self.wrapped.sample_rate(),
                    self.wrapped.num_channels(),
                );
                emitter.flush();
                metrics.cache_hits += 1;
                metrics.cache_hit_chars += chars;
                metrics.cache_hit_audio_bytes += hit.pcm.len() as u64;
                tracing::info!(
                    source = %hit.source,
                    chars,
                    bytes = hit.pcm.len(),
                    "TTS cache hit"
                );
                return;
            }
        }

        // Miss or ineligible: one-shot synthesis, no retry. A failed
        // segment is skipped; the turn keeps going.
        let mut pcm_buffer = BytesMut::new();
        let mut frames = match self.wrapped.synthesize(text).await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::error!(chars, error = %e, "TTS synthesis failed for segment");
                return;
            }
        };
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => {
                    pcm_buffer.extend_from_slice(&frame.data);
                    emitter.push(frame.data.clone());
                    *duration += frame.duration;
                }
                Err(e) => {
                    tracing::error!(chars, error = %e, "TTS synthesis failed for segment");
                    return;
                }
            }
        }
        emitter.flush();

        if !eligible {
            return;
        }

        let pcm = pcm_buffer.freeze();
        if !pcm.is_empty() && pcm.len() <= self.policy.max_audio_bytes {
            self.cache.set(&key, pcm.clone()).await;
            tracing::info!(
                chars,
                bytes = pcm.len(),
                remote = self.cache.remote_enabled(),
                "TTS cache store"
            );
        }
        metrics.cache_misses += 1;
        metrics.cache_miss_chars += chars;
        metrics.cache_miss_audio_bytes += pcm.len() as u64;
    }
}
