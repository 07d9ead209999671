//! In-memory response store with lazy TTL expiry.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::HeaderMap;
use dashmap::DashMap;
use tokio::time::Instant;

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub headers: HeaderMap,
    pub body: Bytes,
    pub expiry: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expiry <= now
    }
}

/// Per-worker response cache keyed by the raw request URL.
///
/// Cloning shares the underlying map. Nothing sweeps the map in the background;
/// an expired entry is removed by the first lookup that observes it.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff a live entry exists. Deletes the entry if it has expired.
    pub fn exists(&self, key: &str) -> bool {
        self.evict_if_expired(key);
        self.inner.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.evict_if_expired(key);
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
        self.inner.insert(key.into(), entry);
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn evict_if_expired(&self, key: &str) {
        let now = Instant::now();
        if self
            .inner
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            tracing::debug!(key = %key, "Evicted expired cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(ttl: Duration, body: &'static str) -> CacheEntry {
        CacheEntry {
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            expiry: Instant::now() + ttl,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_without_writes() {
        let cache = ResponseCache::new();
        cache.set("http://a/x", entry(Duration::from_secs(10), "hello"));

        assert!(cache.exists("http://a/x"));
        assert_eq!(cache.get("http://a/x").unwrap().body, "hello");

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!cache.exists("http://a/x"));
        assert!(cache.get("http://a/x").is_none());
        assert!(cache.is_empty(), "lookup should have deleted the entry");
    }

    #[tokio::test(start_paused = true)]
    async fn get_alone_evicts() {
        let cache = ResponseCache::new();
        cache.set("k", entry(Duration::from_secs(1), "v"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn set_overwrites_and_keys_are_verbatim() {
        let cache = ResponseCache::new();
        cache.set("http://a/x?b=1", entry(Duration::from_secs(60), "first"));
        cache.set("http://a/x?b=1", entry(Duration::from_secs(60), "second"));
        assert_eq!(cache.get("http://a/x?b=1").unwrap().body, "second");
        assert!(!cache.exists("http://a/x?b=01"));
        assert_eq!(cache.len(), 1);
    }
}
