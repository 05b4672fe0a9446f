//! A single cache scope: bounded LRU eviction plus TTL expiry and
//! hit/miss/eviction statistics (spec §4.6). Grounded on the pack's
//! `tree_cache.rs` (probelabs-probe): an `lru::LruCache` behind a
//! `std::sync::Mutex`, sized from a default and overridable per entry.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Snapshot of a scope's lifetime counters (§4.6 `getStatistics`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// One named cache scope (dataset / lookup-result / expression /
/// service-registry). Values must be `Clone` — entries are handed out by
/// value since callers hold them across the guard's lifetime.
pub struct ScopedCache<V> {
    inner: Mutex<LruCache<String, CacheEntry<V>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ScopedCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).expect("max_size is at least 1");
        ScopedCache {
            inner: Mutex::new(LruCache::new(cap)),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Writes or overwrites `key`. An identical key coalesces onto the
    /// same entry rather than manufacturing a duplicate (§4.6 invariant).
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((evicted_key, _)) = guard.push(key.clone(), CacheEntry { value, expires_at }) {
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// An expired entry reads as absent and is evicted on the way out,
    /// regardless of its LRU position (§4.6 invariant).
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let value = entry.value.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Some(_) => {
                guard.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.pop(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.peek(key).is_some_and(|e| e.expires_at > Instant::now())
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
