//! Gateway chat stream
//!
//! The LLM call is delegated to the gateway, which runs the agent with
//! full tool/memory support and replies over Server-Sent Events. This
//! client forwards `stream` deltas into the synthesis input channel as
//! they arrive and reports the `done` event's message id so the session
//! can bind the turn's metrics to it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use joi_voice_config::GatewaySettings;

use crate::pending::{PendingTurn, PendingTurnQueue};
use crate::GatewayError;

/// Spoken fallback when the gateway rejects or breaks the stream
pub const FALLBACK_ERROR: &str = "Sorry, I encountered an error.";
/// Spoken fallback when the gateway is unreachable
pub const FALLBACK_CONNECT: &str = "Sorry, I couldn't connect to the server.";

/// Body of `POST /api/voice/chat`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub conversation_id: String,
    pub agent_id: String,
    pub message: String,
    pub voice_prompt_suffix: String,
}

/// What a finished chat stream produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    /// Gateway-assigned message id from the `done` event, if any
    pub message_id: Option<String>,
    /// Delta count, for latency logging
    pub chunks: u64,
}

/// One SSE event from the chat endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum SseEvent {
    Stream {
        delta: String,
    },
    Done {
        #[serde(rename = "messageId")]
        message_id: Option<String>,
        model: Option<String>,
        #[serde(rename = "latencyMs")]
        latency_ms: Option<u64>,
    },
    Error {
        error: String,
    },
}

/// Incremental splitter for an SSE byte stream.
///
/// Chunks arrive at arbitrary boundaries; a line is complete only at a
/// newline. Carriage returns are tolerated.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    /// Append a chunk and return the completed lines it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the newline
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Parse one SSE line into an event, if it carries one.
pub(crate) fn parse_sse_line(line: &str) -> Option<Result<SseEvent, GatewayError>> {
    let data = line.trim().strip_prefix("data: ")?;
    Some(serde_json::from_str(data).map_err(|e| GatewayError::Decode(e.to_string())))
}

/// Source of reply deltas for one turn.
///
/// `ChatClient` is the production implementation; tests script their own.
/// Implementations push deltas (including any spoken fallback text) into
/// `deltas`, and record a pending turn on the `done` event BEFORE closing
/// the delta channel; the metrics reporter pops the queue as soon as the
/// last segment finishes synthesizing.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        deltas: mpsc::UnboundedSender<String>,
        pending: Arc<PendingTurnQueue>,
    ) -> Result<ChatOutcome, GatewayError>;
}

/// HTTP client for the gateway chat endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    backoff_step: Duration,
}

impl ChatClient {
    /// Build a client with the configured connect/read timeouts.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
        max_attempts: u32,
        backoff_step: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            max_attempts: max_attempts.max(1),
            backoff_step,
        })
    }

    /// Build a client from the gateway section of the worker settings.
    pub fn from_settings(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        Self::new(
            settings.url.clone(),
            Duration::from_secs_f64(settings.connect_timeout_sec),
            Duration::from_secs_f64(settings.read_timeout_sec),
            settings.max_attempts,
            Duration::from_secs_f64(settings.backoff_step_sec),
        )
    }

    /// One attempt at the SSE call. `Err` carries whether any delta had
    /// already been forwarded, which decides retryability.
    async fn attempt(
        &self,
        request: &ChatRequest,
        deltas: &mpsc::UnboundedSender<String>,
        pending: &PendingTurnQueue,
    ) -> Result<ChatOutcome, (GatewayError, u64)> {
        let mut chunks = 0u64;

        let resp = self
            .http
            .post(format!("{}/api/voice/chat", self.base_url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| (GatewayError::Transport(e.to_string()), chunks))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Gateway returned error status");
            let _ = deltas.send(FALLBACK_ERROR.to_string());
            return Ok(ChatOutcome::default());
        }

        let mut lines = SseLineBuffer::default();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err((GatewayError::Transport(e.to_string()), chunks)),
            };
            for line in lines.push(&chunk) {
                let event = match parse_sse_line(&line) {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Skipping undecodable SSE event");
                        continue;
                    }
                    None => continue,
                };
                match event {
                    SseEvent::Stream { delta } => {
                        chunks += 1;
                        let _ = deltas.send(delta);
                    }
                    SseEvent::Done {
                        message_id,
                        model,
                        latency_ms,
                    } => {
                        // Record the descriptor while the delta channel is
                        // still open, so it is queued before the metrics
                        // reporter can run.
                        if let Some(id) = message_id.as_deref().filter(|id| !id.is_empty()) {
                            pending.push(PendingTurn {
                                conversation_id: request.conversation_id.clone(),
                                agent_id: request.agent_id.clone(),
                                message_id: id.to_string(),
                            });
                        }
                        tracing::info!(
                            chunks,
                            model = model.as_deref().unwrap_or("-"),
                            gateway_latency_ms = latency_ms.unwrap_or_default(),
                            "Chat stream done"
                        );
                        return Ok(ChatOutcome { message_id, chunks });
                    }
                    SseEvent::Error { error } => {
                        tracing::error!(error = %error, "Gateway stream error");
                        let _ = deltas.send(FALLBACK_ERROR.to_string());
                        return Ok(ChatOutcome::default());
                    }
                }
            }
        }

        // Stream ended without a `done` event; treat the turn as complete.
        tracing::warn!(chunks, "Chat stream ended without done event");
        Ok(ChatOutcome {
            message_id: None,
            chunks,
        })
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    /// Run the chat call, retrying a connect-phase failure (no delta
    /// forwarded yet) with linear backoff. A mid-stream failure is not
    /// retried: the user already heard the beginning of the reply.
    async fn stream_chat(
        &self,
        request: ChatRequest,
        deltas: mpsc::UnboundedSender<String>,
        pending: Arc<PendingTurnQueue>,
    ) -> Result<ChatOutcome, GatewayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&request, &deltas, &pending).await {
                Ok(outcome) => return Ok(outcome),
                Err((e, chunks)) => {
                    if chunks == 0 && attempt < self.max_attempts {
                        let backoff = self.backoff_step * attempt;
                        tracing::warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "Chat SSE failed before stream started; retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    tracing::error!(attempt, error = %e, "Chat SSE failed");
                    let _ = deltas.send(FALLBACK_CONNECT.to_string());
                    return Ok(ChatOutcome::default());
                }
            }
        }
    }
}
