//! In-process audio cache
//!
//! Bounded LRU mapping from cache key to PCM bytes. Bounded twice: by entry
//! count and by the aggregate byte size of the payloads. Hot phrases
//! ("thinking…", "sure.") hit this tier and skip the network entirely.

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// LRU cache for synthesized PCM, bounded by item count and total bytes.
///
/// All operations are serialized by an internal async mutex; critical
/// sections are O(1) on read and O(entries evicted) on insert.
pub struct LocalAudioCache {
    max_items: usize,
    max_bytes: usize,
    state: Mutex<LocalState>,
}

struct LocalState {
    items: LruCache<String, Bytes>,
    current_bytes: usize,
}

impl LocalAudioCache {
    /// Create a cache holding at most `max_items` entries and `max_bytes`
    /// total payload. `max_items == 0` disables the cache: both operations
    /// become no-ops.
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items,
            max_bytes,
            state: Mutex::new(LocalState {
                // Bounds are enforced manually so the byte limit and the
                // item limit evict through the same loop.
                items: LruCache::unbounded(),
                current_bytes: 0,
            }),
        }
    }

    /// Look up a key, promoting the entry to most-recently-used on hit.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        if self.max_items == 0 {
            return None;
        }
        let mut state = self.state.lock().await;
        state.items.get(key).cloned()
    }

    /// Insert a payload. An entry larger than `max_bytes` is silently
    /// rejected: it could never be evicted down to the budget.
    pub async fn set(&self, key: &str, pcm: Bytes) {
        if self.max_items == 0 || pcm.len() > self.max_bytes {
            return;
        }
        let mut state = self.state.lock().await;

        let added = pcm.len();
        if let Some((_, old)) = state.items.push(key.to_string(), pcm) {
            // Same-key replacement (the cache is unbounded, push never
            // evicts); adjust the byte counter by the displaced payload.
            state.current_bytes -= old.len();
        }
        state.current_bytes += added;

        while state.items.len() > self.max_items || state.current_bytes > self.max_bytes {
            match state.items.pop_lru() {
                Some((_, evicted)) => state.current_bytes -= evicted.len(),
                None => break,
            }
        }
    }

    /// Current entry count (for tests and telemetry).
    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// True when the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current total payload size in bytes.
    pub async fn total_bytes(&self) -> usize {
        self.state.lock().await.current_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    async fn assert_invariants(cache: &LocalAudioCache) {
        let state = cache.state.lock().await;
        let sum: usize = state.items.iter().map(|(_, v)| v.len()).sum();
        assert_eq!(state.current_bytes, sum);
        assert!(state.items.len() <= cache.max_items);
        assert!(state.current_bytes <= cache.max_bytes);
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = LocalAudioCache::new(8, 1024);
        assert!(cache.get("k").await.is_none());

        cache.set("k", pcm(100)).await;
        assert_eq!(cache.get("k").await.unwrap().len(), 100);
        assert_eq!(cache.total_bytes().await, 100);
        assert_invariants(&cache).await;
    }

    #[tokio::test]
    async fn zero_max_items_disables() {
        let cache = LocalAudioCache::new(0, 1024);
        cache.set("k", pcm(10)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn oversize_payload_rejected() {
        let cache = LocalAudioCache::new(8, 100);
        cache.set("big", pcm(101)).await;
        assert!(cache.get("big").await.is_none());
        assert_eq!(cache.total_bytes().await, 0);

        // Exactly at the limit is admitted.
        cache.set("fits", pcm(100)).await;
        assert!(cache.get("fits").await.is_some());
        assert_invariants(&cache).await;
    }

    #[tokio::test]
    async fn replace_adjusts_byte_counter() {
        let cache = LocalAudioCache::new(8, 1024);
        cache.set("k", pcm(100)).await;
        cache.set("k", pcm(40)).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.total_bytes().await, 40);
        assert_invariants(&cache).await;
    }

    #[tokio::test]
    async fn idempotent_set_keeps_total() {
        let cache = LocalAudioCache::new(8, 1024);
        cache.set("k", pcm(64)).await;
        cache.set("k", pcm(64)).await;
        assert_eq!(cache.total_bytes().await, 64);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn item_count_eviction_is_lru() {
        let cache = LocalAudioCache::new(2, 1024);
        cache.set("a", pcm(100)).await;
        cache.set("b", pcm(100)).await;
        // Touch "a" so "b" is least recently used.
        cache.get("a").await.unwrap();
        cache.set("c", pcm(100)).await;

        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
        assert_eq!(cache.total_bytes().await, 200);
        assert_invariants(&cache).await;
    }

    #[tokio::test]
    async fn n_plus_one_sets_evict_exactly_one() {
        let cache = LocalAudioCache::new(3, 10_000);
        for key in ["a", "b", "c", "d"] {
            cache.set(key, pcm(100)).await;
        }
        assert_eq!(cache.len().await, 3);
        assert!(cache.get("a").await.is_none());
        assert_invariants(&cache).await;
    }

    #[tokio::test]
    async fn byte_budget_eviction() {
        let cache = LocalAudioCache::new(100, 250);
        cache.set("a", pcm(100)).await;
        cache.set("b", pcm(100)).await;
        // 300 bytes would exceed the budget; "a" goes.
        cache.set("c", pcm(100)).await;

        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
        assert_invariants(&cache).await;
    }
}
