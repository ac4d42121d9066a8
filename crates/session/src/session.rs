//! Voice session wiring
//!
//! One `VoiceSession` serves one conversation in one room. Per turn it
//! pipes: gateway chat SSE → voice text filters → cached synthesis
//! adapter → room audio sink, and binds the turn's cache metrics to the
//! gateway message they spoke via the pending-turn FIFO.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use joi_voice_cache::{CachePolicy, TtsFingerprint, TwoTierAudioCache};
use joi_voice_config::{TtsCacheSettings, TtsSettings};
use joi_voice_core::StreamingTts;
use joi_voice_gateway::{
    build_voice_prompt, strip_voice_markers, CacheMetricsReport, ChatBackend, ChatOutcome,
    ChatRequest, PendingTurnQueue, PronunciationReplacer, UsageReporter, VoiceUsageReport,
};
use joi_voice_pipeline::{
    CacheMetricsReporter, CachedSynthesisAdapter, OutputEvent, SynthesisInput, TurnMetrics,
};

use crate::SessionError;

/// Identity of the conversation this session speaks for.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub conversation_id: String,
    pub agent_id: String,
}

/// The room publisher boundary.
///
/// The hosting worker implements this against its room SDK; the session
/// only pushes the ordered emitter events of a turn into it.
#[async_trait]
pub trait RoomAudioSink: Send + Sync {
    async fn publish(&self, event: OutputEvent);
}

/// End-of-turn callback binding metrics to the oldest pending turn.
struct TurnReporter {
    ctx: SessionContext,
    tts: TtsSettings,
    usage: Arc<UsageReporter>,
    pending: Arc<PendingTurnQueue>,
}

#[async_trait]
impl CacheMetricsReporter for TurnReporter {
    async fn report(&self, metrics: TurnMetrics) {
        // Consume exactly one descriptor per turn, even when the POST is
        // suppressed, so later turns stay aligned.
        let turn = self.pending.pop();
        self.usage
            .post_cache_metrics(CacheMetricsReport {
                conversation_id: self.ctx.conversation_id.clone(),
                agent_id: self.ctx.agent_id.clone(),
                message_id: turn.map(|t| t.message_id),
                provider: self.tts.provider.clone(),
                model: self.tts.model.clone(),
                voice: self.tts.voice.clone(),
                metrics,
            })
            .await;
    }
}

/// A live voice session.
pub struct VoiceSession {
    ctx: SessionContext,
    tts: TtsSettings,
    chat: Arc<dyn ChatBackend>,
    adapter: CachedSynthesisAdapter,
    usage: Arc<UsageReporter>,
    pending: Arc<PendingTurnQueue>,
    sink: Arc<dyn RoomAudioSink>,
}

impl VoiceSession {
    /// Wire a session around a wrapped TTS provider and the process-wide
    /// audio cache.
    pub fn new(
        ctx: SessionContext,
        tts: TtsSettings,
        cache_settings: &TtsCacheSettings,
        wrapped: Arc<dyn StreamingTts>,
        cache: Arc<TwoTierAudioCache>,
        chat: Arc<dyn ChatBackend>,
        usage: Arc<UsageReporter>,
        sink: Arc<dyn RoomAudioSink>,
    ) -> Self {
        let fingerprint = TtsFingerprint {
            provider: tts.provider.clone(),
            model: tts.model.clone(),
            voice: tts.voice.clone(),
            sample_rate: wrapped.sample_rate(),
            num_channels: wrapped.num_channels(),
        };

        let mut policy = CachePolicy::from_settings(cache_settings);
        if !cache_settings.enabled {
            // Cache bypass: with nothing eligible the adapter degrades to
            // plain segmented streaming through the wrapped provider.
            policy.max_text_chars = 0;
            tracing::info!("TTS cache disabled");
        } else {
            tracing::info!(
                local_max_items = cache_settings.local_max_items,
                local_max_bytes = cache_settings.local_max_bytes,
                remote_enabled = cache.remote_enabled(),
                remote_backends = %cache.remote_backends().join(","),
                max_text_chars = cache_settings.max_text_chars,
                max_audio_bytes = cache_settings.max_audio_bytes,
                "TTS cache enabled"
            );
        }

        let pending = Arc::new(PendingTurnQueue::new());
        let reporter = Arc::new(TurnReporter {
            ctx: ctx.clone(),
            tts: tts.clone(),
            usage: Arc::clone(&usage),
            pending: Arc::clone(&pending),
        });

        let adapter = CachedSynthesisAdapter::new(wrapped, cache, policy, fingerprint)
            .with_reporter(reporter);

        Self {
            ctx,
            tts,
            chat,
            adapter,
            usage,
            pending,
            sink,
        }
    }

    /// Pending turns awaiting a metrics report (for tests and diagnostics).
    pub fn pending_turns(&self) -> usize {
        self.pending.len()
    }

    /// Run one full turn for a final user transcript.
    ///
    /// Returns once all audio events of the turn have been handed to the
    /// room sink and the metrics callback has fired.
    pub async fn run_turn(&self, user_text: &str) -> Result<ChatOutcome, SessionError> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Ok(ChatOutcome::default());
        }

        let mut stream = self.adapter.stream();
        let input = stream
            .take_input()
            .ok_or_else(|| SessionError::Internal("synthesis input already taken".to_string()))?;

        let request = ChatRequest {
            conversation_id: self.ctx.conversation_id.clone(),
            agent_id: self.ctx.agent_id.clone(),
            message: user_text.to_string(),
            voice_prompt_suffix: build_voice_prompt(&self.tts),
        };

        let (delta_tx, delta_rx) = mpsc::unbounded_channel();
        let chat = Arc::clone(&self.chat);
        let pending = Arc::clone(&self.pending);
        let chat_task =
            tokio::spawn(async move { chat.stream_chat(request, delta_tx, pending).await });

        // Reply deltas pass through the voice filters on their way into
        // the tokenizer; the input handle is dropped when the chat stream
        // closes, which ends the turn.
        let forward = self.forward_deltas(delta_rx, input);

        // Drain emitter events to the room for the whole turn.
        let publish = async {
            while let Some(event) = stream.next_event().await {
                self.sink.publish(event).await;
            }
        };

        let ((), ()) = tokio::join!(forward, publish);

        let outcome = chat_task
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?
            .map_err(SessionError::Chat)?;

        stream.shutdown().await;
        Ok(outcome)
    }

    async fn forward_deltas(
        &self,
        mut deltas: mpsc::UnboundedReceiver<String>,
        input: SynthesisInput,
    ) {
        let mut replacer = PronunciationReplacer::new(&self.tts.pronunciations);
        while let Some(delta) = deltas.recv().await {
            let replaced = replacer.push(&delta);
            if replaced.is_empty() {
                continue;
            }
            let cleaned = strip_voice_markers(&replaced);
            if !cleaned.is_empty() {
                input.push_delta(cleaned);
            }
        }
        let remaining = replacer.flush();
        if !remaining.is_empty() {
            let cleaned = strip_voice_markers(&remaining);
            if !cleaned.is_empty() {
                input.push_delta(cleaned);
            }
        }
        // input drops here, closing the turn.
    }

    /// Forward an STT usage event from the transcription collaborator.
    pub async fn report_stt_usage(&self, provider: &str, model: &str, duration_ms: u64) {
        if duration_ms == 0 {
            return;
        }
        self.usage
            .post_usage(VoiceUsageReport {
                conversation_id: self.ctx.conversation_id.clone(),
                agent_id: self.ctx.agent_id.clone(),
                provider: provider.to_string(),
                service: "stt".to_string(),
                model: model.to_string(),
                duration_ms,
                characters: 0,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use joi_voice_cache::LocalAudioCache;
    use joi_voice_core::{AudioFrame, AudioStream, Error, Result};
    use joi_voice_gateway::{GatewayError, PendingTurn};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SAMPLE_RATE: u32 = 24_000;

    struct MockTts {
        calls: AtomicUsize,
        texts: Mutex<Vec<String>>,
    }

    impl MockTts {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StreamingTts for MockTts {
        fn sample_rate(&self) -> u32 {
            SAMPLE_RATE
        }

        fn num_channels(&self) -> u32 {
            1
        }

        async fn synthesize(&self, text: &str) -> Result<AudioStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().push(text.to_string());
            if text.contains("fail") {
                return Err(Error::Synthesis("mock fault".to_string()));
            }
            let frame = AudioFrame::from_pcm(Bytes::from(vec![0u8; 4800]), SAMPLE_RATE, 1);
            Ok(Box::pin(futures::stream::iter(vec![Ok(frame)])))
        }
    }

    /// Scripted chat backend: emits fixed deltas, then a done message id.
    struct ScriptedChat {
        deltas: Vec<&'static str>,
        message_id: Option<&'static str>,
    }

    #[async_trait]
    impl ChatBackend for ScriptedChat {
        async fn stream_chat(
            &self,
            request: ChatRequest,
            deltas: mpsc::UnboundedSender<String>,
            pending: Arc<PendingTurnQueue>,
        ) -> std::result::Result<ChatOutcome, GatewayError> {
            for delta in &self.deltas {
                let _ = deltas.send((*delta).to_string());
            }
            if let Some(id) = self.message_id {
                pending.push(PendingTurn {
                    conversation_id: request.conversation_id,
                    agent_id: request.agent_id,
                    message_id: id.to_string(),
                });
            }
            Ok(ChatOutcome {
                message_id: self.message_id.map(str::to_string),
                chunks: self.deltas.len() as u64,
            })
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<OutputEvent>>,
    }

    #[async_trait]
    impl RoomAudioSink for CollectingSink {
        async fn publish(&self, event: OutputEvent) {
            self.events.lock().push(event);
        }
    }

    fn ctx() -> SessionContext {
        SessionContext {
            conversation_id: "c1".to_string(),
            agent_id: "personal".to_string(),
        }
    }

    fn session(
        chat: ScriptedChat,
        cache_settings: TtsCacheSettings,
        tts_settings: TtsSettings,
    ) -> (VoiceSession, Arc<MockTts>, Arc<CollectingSink>) {
        let tts = Arc::new(MockTts::new());
        let sink = Arc::new(CollectingSink::default());
        let cache = Arc::new(TwoTierAudioCache::new(
            LocalAudioCache::new(cache_settings.local_max_items, cache_settings.local_max_bytes),
            None,
        ));
        // Points at nothing routable; posts fail silently, which is the
        // contract anyway.
        let usage = Arc::new(UsageReporter::new("http://127.0.0.1:9").unwrap());
        let session = VoiceSession::new(
            ctx(),
            tts_settings,
            &cache_settings,
            Arc::clone(&tts) as Arc<dyn StreamingTts>,
            cache,
            Arc::new(chat),
            usage,
            Arc::clone(&sink) as Arc<dyn RoomAudioSink>,
        );
        (session, tts, sink)
    }

    #[tokio::test]
    async fn turn_streams_audio_to_sink() {
        let chat = ScriptedChat {
            deltas: vec!["Hello ", "there. "],
            message_id: Some("m-1"),
        };
        let (session, tts, sink) = session(chat, TtsCacheSettings::default(), TtsSettings::default());

        let outcome = session.run_turn("hi").await.unwrap();
        assert_eq!(outcome.message_id.as_deref(), Some("m-1"));

        let events = sink.events.lock();
        assert!(matches!(events[0], OutputEvent::Initialized { .. }));
        assert!(events.iter().any(|e| matches!(e, OutputEvent::Pcm(_))));
        assert_eq!(*tts.texts.lock(), ["Hello there."]);

        // The metrics reporter consumed the descriptor.
        assert_eq!(session.pending_turns(), 0);
    }

    #[tokio::test]
    async fn empty_user_text_is_a_no_op() {
        let chat = ScriptedChat {
            deltas: vec!["never sent"],
            message_id: None,
        };
        let (session, tts, sink) = session(chat, TtsCacheSettings::default(), TtsSettings::default());

        let outcome = session.run_turn("   ").await.unwrap();
        assert_eq!(outcome, ChatOutcome::default());
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn voice_filters_shape_synthesized_text() {
        let chat = ScriptedChat {
            deltas: vec!["[happy] ask JOI", " for help. "],
            message_id: None,
        };
        let tts_settings = TtsSettings {
            pronunciations: vec![joi_voice_config::PronunciationRule {
                word: "JOI".to_string(),
                replacement: "joy".to_string(),
            }],
            ..Default::default()
        };
        let (session, tts, _sink) = session(chat, TtsCacheSettings::default(), tts_settings);

        session.run_turn("hi").await.unwrap();
        assert_eq!(*tts.texts.lock(), ["ask joy for help."]);
    }

    #[tokio::test]
    async fn second_turn_hits_cache() {
        let settings = TtsCacheSettings::default();
        let tts = Arc::new(MockTts::new());
        let sink = Arc::new(CollectingSink::default());
        let cache = Arc::new(TwoTierAudioCache::new(
            LocalAudioCache::new(settings.local_max_items, settings.local_max_bytes),
            None,
        ));
        let usage = Arc::new(UsageReporter::new("http://127.0.0.1:9").unwrap());
        let chat = ScriptedChat {
            deltas: vec!["Same reply. "],
            message_id: None,
        };
        let session = VoiceSession::new(
            ctx(),
            TtsSettings::default(),
            &settings,
            Arc::clone(&tts) as Arc<dyn StreamingTts>,
            cache,
            Arc::new(chat),
            usage,
            Arc::clone(&sink) as Arc<dyn RoomAudioSink>,
        );

        session.run_turn("hi").await.unwrap();
        session.run_turn("hi again").await.unwrap();

        // Identical reply text: the second turn is served from cache.
        assert_eq!(tts.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_synthesizes() {
        let settings = TtsCacheSettings {
            enabled: false,
            ..Default::default()
        };
        let tts = Arc::new(MockTts::new());
        let sink = Arc::new(CollectingSink::default());
        let cache = Arc::new(TwoTierAudioCache::from_settings(&settings));
        let usage = Arc::new(UsageReporter::new("http://127.0.0.1:9").unwrap());
        let chat = ScriptedChat {
            deltas: vec!["Same reply. "],
            message_id: None,
        };
        let session = VoiceSession::new(
            ctx(),
            TtsSettings::default(),
            &settings,
            Arc::clone(&tts) as Arc<dyn StreamingTts>,
            cache,
            Arc::new(chat),
            usage,
            Arc::clone(&sink) as Arc<dyn RoomAudioSink>,
        );

        session.run_turn("hi").await.unwrap();
        session.run_turn("hi again").await.unwrap();
        assert_eq!(tts.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_fault_does_not_fail_the_turn() {
        let chat = ScriptedChat {
            deltas: vec!["Good one. Now fail here. Good again. "],
            message_id: Some("m-2"),
        };
        let (session, tts, sink) = session(chat, TtsCacheSettings::default(), TtsSettings::default());

        let outcome = session.run_turn("hi").await.unwrap();
        assert_eq!(outcome.message_id.as_deref(), Some("m-2"));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 3);

        // Two segments produced PCM, the faulty one stayed silent.
        let pcm_events = sink
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, OutputEvent::Pcm(_)))
            .count();
        assert_eq!(pcm_events, 2);
    }
}
