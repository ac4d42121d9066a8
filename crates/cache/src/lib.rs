//! Two-tier PCM audio cache for the JOI voice worker
//!
//! Short assistant phrases recur constantly ("Sure.", "One moment.");
//! re-synthesizing them burns provider quota and first-word latency. This
//! crate caches the synthesized s16le PCM for such segments in two tiers:
//!
//! - a bounded in-process LRU ([`LocalAudioCache`])
//! - an optional chain of remote backends with TTL and backfill
//!   ([`RemoteChain`], Redis-backed by default)
//!
//! composed behind a single get/set facade ([`TwoTierAudioCache`]). All
//! tiers are best-effort: a cache fault degrades to a synthesis call, never
//! to a failed turn.

pub mod chain;
pub mod key;
pub mod local;
pub mod remote;
pub mod two_tier;

pub use chain::RemoteChain;
pub use key::{build_cache_key, normalize_text, CachePolicy, TtsFingerprint};
pub use local::LocalAudioCache;
pub use remote::{RedisAudioCache, RemoteAudioCache};
pub use two_tier::{TwoTierAudioCache, LOCAL_SOURCE};

use bytes::Bytes;

/// A cache hit: the PCM payload and the tier that produced it.
///
/// `source` is either [`LOCAL_SOURCE`] or a remote backend's name.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub pcm: Bytes,
    pub source: String,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    use crate::remote::RemoteAudioCache;

    /// In-memory stand-in for a remote backend.
    pub struct FakeRemote {
        name: &'static str,
        enabled: bool,
        faulty: bool,
        store: Mutex<HashMap<String, Bytes>>,
    }

    impl FakeRemote {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                enabled: true,
                faulty: false,
                store: Mutex::new(HashMap::new()),
            }
        }

        /// Report `enabled() == false`, as a backend whose client failed
        /// construction would.
        pub fn disabled(mut self) -> Self {
            self.enabled = false;
            self
        }

        /// Swallow every operation, as a backend behind a dead network
        /// link would.
        pub fn faulty(mut self) -> Self {
            self.faulty = true;
            self
        }

        pub fn insert(&self, key: &str, pcm: &[u8]) {
            self.store
                .lock()
                .insert(key.to_string(), Bytes::copy_from_slice(pcm));
        }

        /// Direct store access, bypassing the fault flag.
        pub fn raw_get(&self, key: &str) -> Option<Bytes> {
            self.store.lock().get(key).cloned()
        }
    }

    #[async_trait]
    impl RemoteAudioCache for FakeRemote {
        fn name(&self) -> &str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn get(&self, key: &str) -> Option<Bytes> {
            if self.faulty {
                return None;
            }
            self.store.lock().get(key).cloned()
        }

        async fn set(&self, key: &str, pcm: &[u8]) {
            if self.faulty {
                return;
            }
            self.insert(key, pcm);
        }
    }
}
