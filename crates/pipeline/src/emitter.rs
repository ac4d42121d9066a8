//! Output emitter
//!
//! The boundary between the synthesis pipeline and the room publisher. The
//! adapter pushes PCM frames, timed transcript markers, and segment
//! framing onto the emitter; the session side drains the event stream and
//! feeds the room's audio track. Delivery is best-effort: if the consumer
//! hangs up mid-turn the remaining events are dropped silently and the
//! turn still runs to completion for its metrics.

use bytes::Bytes;
use tokio::sync::mpsc;

/// MIME type of every payload this worker emits
pub const PCM_MIME_TYPE: &str = "audio/pcm";

/// A transcript marker anchored to the audio timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedTranscript {
    /// Segment text as produced by the tokenizer
    pub text: String,
    /// Seconds of audio emitted before this segment started
    pub start_time: f64,
}

/// Events pushed onto the room publisher per turn, in order.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    /// Stream header; exactly one per turn, before any audio
    Initialized {
        request_id: String,
        sample_rate: u32,
        num_channels: u32,
        mime_type: &'static str,
        streaming: bool,
    },
    /// A new spoken segment begins
    SegmentStarted { segment_id: String },
    /// Transcript marker for the segment about to be spoken
    Transcript(TimedTranscript),
    /// Raw s16le PCM
    Pcm(Bytes),
    /// Push buffered audio out to the track now
    Flush,
}

/// Write half of the per-turn output channel.
pub struct AudioEmitter {
    tx: mpsc::UnboundedSender<OutputEvent>,
}

impl AudioEmitter {
    /// Create an emitter and the receiver the session side drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn initialize(&self, request_id: String, sample_rate: u32, num_channels: u32) {
        self.send(OutputEvent::Initialized {
            request_id,
            sample_rate,
            num_channels,
            mime_type: PCM_MIME_TYPE,
            streaming: true,
        });
    }

    pub fn start_segment(&self, segment_id: String) {
        self.send(OutputEvent::SegmentStarted { segment_id });
    }

    pub fn push_timed_transcript(&self, text: &str, start_time: f64) {
        self.send(OutputEvent::Transcript(TimedTranscript {
            text: text.to_string(),
            start_time,
        }));
    }

    pub fn push(&self, pcm: Bytes) {
        self.send(OutputEvent::Pcm(pcm));
    }

    pub fn flush(&self) {
        self.send(OutputEvent::Flush);
    }

    fn send(&self, event: OutputEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (emitter, mut rx) = AudioEmitter::channel();
        emitter.initialize("req-1".to_string(), 24_000, 1);
        emitter.start_segment("seg-1".to_string());
        emitter.push_timed_transcript("Hello.", 0.0);
        emitter.push(Bytes::from_static(b"pcm"));
        emitter.flush();

        assert!(matches!(
            rx.recv().await.unwrap(),
            OutputEvent::Initialized { sample_rate: 24_000, num_channels: 1, streaming: true, .. }
        ));
        assert!(matches!(rx.recv().await.unwrap(), OutputEvent::SegmentStarted { .. }));
        match rx.recv().await.unwrap() {
            OutputEvent::Transcript(t) => {
                assert_eq!(t.text, "Hello.");
                assert_eq!(t.start_time, 0.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), OutputEvent::Pcm(_)));
        assert!(matches!(rx.recv().await.unwrap(), OutputEvent::Flush));
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (emitter, rx) = AudioEmitter::channel();
        drop(rx);
        emitter.push(Bytes::from_static(b"pcm"));
        emitter.flush();
    }
}
