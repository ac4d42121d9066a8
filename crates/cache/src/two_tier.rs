//! Two-tier cache facade

use std::sync::Arc;

use bytes::Bytes;

use joi_voice_config::TtsCacheSettings;

use crate::chain::RemoteChain;
use crate::local::LocalAudioCache;
use crate::remote::{RedisAudioCache, RemoteAudioCache};
use crate::CacheHit;

/// Hit source tag for the in-process tier
pub const LOCAL_SOURCE: &str = "local";

/// Local LRU tier composed with an optional remote chain.
///
/// The local tier eliminates per-turn network cost for hot phrases; the
/// remote tier shares entries across replicas and survives restarts. A
/// remote hit is copied into the local tier before being returned, so the
/// next lookup is served in-process.
pub struct TwoTierAudioCache {
    local: LocalAudioCache,
    remote: Option<RemoteChain>,
}

impl TwoTierAudioCache {
    pub fn new(local: LocalAudioCache, remote: Option<RemoteChain>) -> Self {
        Self { local, remote }
    }

    /// Build the facade from settings: local tier sized per the local
    /// bounds, one Redis backend when a URL is configured.
    pub fn from_settings(settings: &TtsCacheSettings) -> Self {
        let local = LocalAudioCache::new(settings.local_max_items, settings.local_max_bytes);

        let remote = if settings.remote_configured() {
            let redis: Arc<dyn RemoteAudioCache> = Arc::new(RedisAudioCache::new(
                settings.redis_url.clone(),
                settings.redis_ttl_sec,
                settings.max_audio_bytes,
            ));
            let chain = RemoteChain::new(vec![redis]);
            chain.enabled().then_some(chain)
        } else {
            None
        };

        Self { local, remote }
    }

    /// True when a non-empty remote chain is attached.
    pub fn remote_enabled(&self) -> bool {
        self.remote.as_ref().is_some_and(RemoteChain::enabled)
    }

    /// Remote backend names, for startup logging.
    pub fn remote_backends(&self) -> Vec<String> {
        self.remote.as_ref().map(RemoteChain::backends).unwrap_or_default()
    }

    /// Local first; on a remote hit, populate local and preserve the
    /// remote source tag.
    pub async fn get(&self, key: &str) -> Option<CacheHit> {
        if let Some(pcm) = self.local.get(key).await {
            return Some(CacheHit {
                pcm,
                source: LOCAL_SOURCE.to_string(),
            });
        }

        let remote = self.remote.as_ref()?;
        let hit = remote.get(key).await?;
        self.local.set(key, hit.pcm.clone()).await;
        Some(hit)
    }

    /// Write to the local tier, and to the remote chain when enabled.
    pub async fn set(&self, key: &str, pcm: Bytes) {
        self.local.set(key, pcm.clone()).await;
        if let Some(remote) = &self.remote {
            remote.set(key, &pcm).await;
        }
    }
}
