//! Ordered chain of remote backends

use std::sync::Arc;

use bytes::Bytes;

use crate::remote::RemoteAudioCache;
use crate::CacheHit;

/// Remote backends consulted highest-priority-first.
///
/// A hit found deeper in the chain is written back to every backend in
/// front of it ("backfill"), so the fastest tier converges on the hot set.
/// Writes fan out to all backends; per-backend failures are independent.
pub struct RemoteChain {
    remotes: Vec<Arc<dyn RemoteAudioCache>>,
}

impl RemoteChain {
    /// Build a chain from the given backends, dropping any that are
    /// already disabled.
    pub fn new(remotes: Vec<Arc<dyn RemoteAudioCache>>) -> Self {
        Self {
            remotes: remotes.into_iter().filter(|r| r.enabled()).collect(),
        }
    }

    /// True when at least one backend survived construction.
    pub fn enabled(&self) -> bool {
        !self.remotes.is_empty()
    }

    /// Backend names in priority order, for startup logging.
    pub fn backends(&self) -> Vec<String> {
        self.remotes.iter().map(|r| r.name().to_string()).collect()
    }

    /// Query backends in order; backfill shallower backends on a deep hit.
    pub async fn get(&self, key: &str) -> Option<CacheHit> {
        for (idx, remote) in self.remotes.iter().enumerate() {
            let Some(pcm) = remote.get(key).await else {
                continue;
            };
            for backfill in &self.remotes[..idx] {
                backfill.set(key, &pcm).await;
            }
            return Some(CacheHit {
                pcm,
                source: remote.name().to_string(),
            });
        }
        None
    }

    /// Write to every backend in the chain.
    pub async fn set(&self, key: &str, pcm: &Bytes) {
        for remote in &self.remotes {
            remote.set(key, pcm).await;
        }
    }
}
