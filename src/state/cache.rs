//! Result cache with TTL expiry and invalidation groups

use crate::metrics::CACHE_REQUESTS_TOTAL;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Group holding every search result set
pub const SEARCH_GROUP: &str = "search";

/// A cached value, stored as serialized JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub group: String,
    /// Group generation at insert time; older generations are stale
    pub generation: u64,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Memoizes expensive results. Entries may vanish at any time; every
/// failure falls back to computing the value directly.
#[derive(Clone)]
pub struct SearchCache {
    cache: Cache<String, CacheEntry>,
    generations: Arc<DashMap<String, u64>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    enabled: bool,
}

impl SearchCache {
    /// `max_ttl` bounds how long any entry can live regardless of the ttl
    /// passed to [`SearchCache::remember`]
    pub fn new(max_capacity: u64, max_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(max_ttl.max(Duration::from_secs(1)))
            .build();

        Self {
            cache,
            generations: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            enabled: true,
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1, Duration::from_secs(1))
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn generation(&self, group: &str) -> u64 {
        self.generations.get(group).map(|g| *g).unwrap_or(0)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str, group: &str) -> Option<T> {
        let entry = self.cache.get(key).await?;

        if entry.is_expired() || entry.group != group || entry.generation != self.generation(group) {
            self.cache.invalidate(key).await;
            return None;
        }

        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Dropping unreadable cache entry");
                CACHE_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
                self.cache.invalidate(key).await;
                None
            }
        }
    }

    /// Store under the group generation observed before `value` was computed,
    /// so an invalidation racing the computation still marks it stale
    async fn store<T: Serialize>(
        &self,
        key: &str,
        group: &str,
        generation: u64,
        ttl: Duration,
        value: &T,
    ) {
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(key, error = %e, "Value not cacheable");
                CACHE_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
                return;
            }
        };

        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let entry = CacheEntry {
            key: key.to_string(),
            value: serialized,
            expires_at: Utc::now() + ttl,
            group: group.to_string(),
            generation,
        };
        self.cache.insert(key.to_string(), entry).await;
    }

    /// Return the cached value for `key`, or compute, store and return it
    pub async fn remember<T, E, F, Fut>(
        &self,
        key: &str,
        group: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if !self.enabled {
            CACHE_REQUESTS_TOTAL.with_label_values(&["bypass"]).inc();
            return compute().await;
        }

        if let Some(value) = self.lookup(key, group).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            CACHE_REQUESTS_TOTAL.with_label_values(&["hit"]).inc();
            tracing::debug!(key, group, "Cache hit");
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        CACHE_REQUESTS_TOTAL.with_label_values(&["miss"]).inc();

        let generation = self.generation(group);
        let value = compute().await?;
        self.store(key, group, generation, ttl, &value).await;
        Ok(value)
    }

    /// Invalidate every entry of a group
    pub fn invalidate_group(&self, group: &str) {
        *self.generations.entry(group.to_string()).or_insert(0) += 1;
        tracing::debug!(group, "Cache group invalidated");
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}

/// SHA-256 hex digest over the key parts
pub fn cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Unit separator keeps ["ab", "c"] and ["a", "bc"] apart
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    async fn counted(counter: &AtomicUsize, value: u32) -> Result<u32, String> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn test_remember_computes_once() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first = cache
            .remember("k", SEARCH_GROUP, Duration::from_secs(60), || counted(&calls, 7))
            .await
            .unwrap();
        let second = cache
            .remember("k", SEARCH_GROUP, Duration::from_secs(60), || counted(&calls, 8))
            .await
            .unwrap();

        assert_eq!((first, second), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_entry_ttl() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache
            .remember("k", SEARCH_GROUP, Duration::from_millis(50), || counted(&calls, 1))
            .await
            .unwrap();

        // Wait for TTL to expire
        tokio::time::sleep(Duration::from_millis(100)).await;

        cache
            .remember("k", SEARCH_GROUP, Duration::from_millis(50), || counted(&calls, 2))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_group() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        cache.remember("a", SEARCH_GROUP, ttl, || counted(&calls, 1)).await.unwrap();
        cache.remember("b", "other", ttl, || counted(&calls, 1)).await.unwrap();

        cache.invalidate_group(SEARCH_GROUP);

        cache.remember("a", SEARCH_GROUP, ttl, || counted(&calls, 1)).await.unwrap();
        cache.remember("b", "other", ttl, || counted(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_discards_result() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let ttl = Duration::from_secs(60);

        let stale: Result<String, String> = cache
            .remember("k", SEARCH_GROUP, ttl, || async {
                cache.invalidate_group(SEARCH_GROUP);
                Ok("stale".to_string())
            })
            .await;
        assert_eq!(stale.unwrap(), "stale");

        let fresh: Result<String, String> = cache
            .remember("k", SEARCH_GROUP, ttl, || async { Ok("fresh".to_string()) })
            .await;
        assert_eq!(fresh.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let ttl = Duration::from_secs(60);

        let failed: Result<u32, String> = cache
            .remember("k", SEARCH_GROUP, ttl, || async { Err("boom".to_string()) })
            .await;
        assert!(failed.is_err());

        let ok: Result<u32, String> = cache.remember("k", SEARCH_GROUP, ttl, || async { Ok(3) }).await;
        assert_eq!(ok.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_computes() {
        let cache = SearchCache::disabled();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        cache.remember("k", SEARCH_GROUP, ttl, || counted(&calls, 1)).await.unwrap();
        cache.remember("k", SEARCH_GROUP, ttl, || counted(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_cache_key() {
        let key = cache_key(&["vue", "all", "relevance"]);
        assert_eq!(key.len(), 64);
        assert_eq!(key, cache_key(&["vue", "all", "relevance"]));
        assert_ne!(cache_key(&["ab", "c"]), cache_key(&["a", "bc"]));
    }
}
