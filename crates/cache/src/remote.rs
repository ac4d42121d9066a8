//! Remote audio cache backends
//!
//! A remote backend is best-effort by contract: every transport or decoding
//! fault degrades to "absent" on reads and to a no-op on writes. The worker
//! must keep speaking when the cache infrastructure is down.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

/// Connect-phase timeout for the remote client
const CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
/// Per-command response timeout
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// A named, best-effort key/value backend for PCM payloads.
///
/// `name` is a stable identifier used as the hit source tag in telemetry.
#[async_trait]
pub trait RemoteAudioCache: Send + Sync {
    /// Stable backend name for telemetry
    fn name(&self) -> &str;

    /// False once the backend is known to be unusable
    fn enabled(&self) -> bool;

    /// Fetch a payload; any fault or oversized value reads as absent.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Store a payload with the backend's TTL; faults are swallowed.
    async fn set(&self, key: &str, pcm: &[u8]);
}

/// Redis-backed remote tier.
///
/// The connection is created lazily on first use and kept for the process
/// lifetime. Construction is attempted exactly once: a failure permanently
/// disables the backend rather than adding reconnect latency to every turn.
pub struct RedisAudioCache {
    url: String,
    ttl_sec: u64,
    max_audio_bytes: usize,
    conn: OnceCell<Option<redis::aio::MultiplexedConnection>>,
}

impl RedisAudioCache {
    pub fn new(redis_url: impl Into<String>, ttl_sec: u64, max_audio_bytes: usize) -> Self {
        Self {
            url: redis_url.into().trim().to_string(),
            ttl_sec,
            max_audio_bytes,
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        if self.url.is_empty() {
            return None;
        }
        self.conn
            .get_or_init(|| async {
                let client = match redis::Client::open(self.url.as_str()) {
                    Ok(client) => client,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed creating Redis cache client");
                        return None;
                    }
                };
                match client
                    .get_multiplexed_tokio_connection_with_response_timeouts(
                        RESPONSE_TIMEOUT,
                        CONNECT_TIMEOUT,
                    )
                    .await
                {
                    Ok(conn) => Some(conn),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed connecting Redis cache client");
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

#[async_trait]
impl RemoteAudioCache for RedisAudioCache {
    fn name(&self) -> &str {
        "redis"
    }

    fn enabled(&self) -> bool {
        !self.url.is_empty() && self.conn.get().map_or(true, Option::is_some)
    }

    async fn get(&self, key: &str) -> Option<Bytes> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(Some(raw)) => {
                if raw.len() > self.max_audio_bytes {
                    tracing::warn!(
                        bytes = raw.len(),
                        key_prefix = key.get(..24).unwrap_or(key),
                        "Redis cached payload too large, ignoring"
                    );
                    return None;
                }
                Some(Bytes::from(raw))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Redis cache get failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, pcm: &[u8]) {
        if pcm.len() > self.max_audio_bytes {
            return;
        }
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = conn.set_ex::<_, _, ()>(key, pcm, self.ttl_sec).await {
            tracing::debug!(error = %e, "Redis cache set failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_url_is_disabled() {
        let cache = RedisAudioCache::new("", 60, 1024);
        assert!(!cache.enabled());
        assert!(cache.get("k").await.is_none());
        cache.set("k", b"pcm").await; // must not panic
    }

    #[tokio::test]
    async fn bad_url_disables_permanently() {
        let cache = RedisAudioCache::new("not-a-redis-url", 60, 1024);
        // Enabled until the first construction attempt fails.
        assert!(cache.enabled());
        assert!(cache.get("k").await.is_none());
        assert!(!cache.enabled());
        // Subsequent operations stay no-ops without re-attempting.
        cache.set("k", b"pcm").await;
        assert!(cache.get("k").await.is_none());
    }
}
