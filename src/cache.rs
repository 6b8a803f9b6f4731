//! TTL + LRU cache with single-flight fetch.
//!
//! Spec §4.15 and §9's Open Question: the source carried two incompatible
//! `Cache` implementations, one with injectable clock and thundering-herd
//! protection and one without. This type is the single parameterized
//! replacement recording both capabilities, resolving that duplication
//! (documented in `DESIGN.md`). Grounded on the teacher's `infrastructure`
//! caching layer idiom, generalized with an injected [`Clock`] and a
//! `tokio::sync::Mutex`-guarded single-flight map for `get_or_fetch`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::clock::Clock;

struct Entry<V> {
    value: V,
    expires_at_ms: Option<i64>,
    last_access_ms: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type InFlight<V> = Arc<OnceCell<V>>;

/// A bounded cache combining TTL expiry and least-recently-accessed
/// eviction, with single-flight coalescing of concurrent misses on the
/// same key via [`get_or_fetch`](Self::get_or_fetch).
pub struct Cache<K, V> {
    clock: Arc<dyn Clock>,
    max_size: usize,
    inner: Mutex<HashMap<K, Entry<V>>>,
    in_flight: Mutex<HashMap<K, InFlight<V>>>,
    stats: Mutex<CacheStats>,
}

impl<K, V> Cache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, max_size: usize) -> Self {
        Self {
            clock,
            max_size,
            inner: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        *self.stats.lock().await
    }

    /// Returns the cached value if present and unexpired; expired entries
    /// are evicted on access.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        let expired = match inner.get(key) {
            Some(entry) => entry.expires_at_ms.is_some_and(|exp| now >= exp),
            None => false,
        };
        if expired {
            inner.remove(key);
        }
        let hit = inner.get_mut(key).map(|entry| {
            entry.last_access_ms = now;
            entry.value.clone()
        });
        let mut stats = self.stats.lock().await;
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Insert `value`, evicting the least-recently-accessed entry first if
    /// at capacity and `key` is not already present.
    pub async fn set(&self, key: K, value: V, ttl_ms: Option<i64>) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        if inner.len() >= self.max_size && !inner.contains_key(&key) {
            if let Some(oldest_key) =
                inner.iter().min_by_key(|(_, e)| e.last_access_ms).map(|(k, _)| k.clone())
            {
                inner.remove(&oldest_key);
            }
        }
        inner.insert(
            key,
            Entry { value, expires_at_ms: ttl_ms.map(|ttl| now + ttl), last_access_ms: now },
        );
    }

    /// Single-flight fetch: concurrent misses on the same key share one
    /// invocation of `fetcher`; misses on different keys proceed
    /// concurrently.
    ///
    /// Every caller that misses looks up (or creates) the same
    /// `Arc<OnceCell<V>>` for `key` and calls `get_or_init` on it — tokio's
    /// `OnceCell` only ever runs the *first* caller's initializer; every
    /// other concurrent caller awaits that result instead of invoking its
    /// own closure, which is exactly the thundering-herd protection this
    /// cache needs.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, ttl_ms: Option<i64>, fetcher: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(&key).await {
            return value;
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let value = cell.get_or_init(fetcher).await.clone();
        self.set(key.clone(), value.clone(), ttl_ms).await;
        self.in_flight.lock().await.remove(&key);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn get_returns_none_before_set() {
        let cache: Cache<&str, i32> = Cache::new(FakeClock::new(0), 10);
        assert!(cache.get(&"k").await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_access() {
        let clock = FakeClock::new(0);
        let cache: Cache<&str, i32> = Cache::new(clock.clone(), 10);
        cache.set("k", 1, Some(100)).await;
        clock.advance(200);
        assert!(cache.get(&"k").await.is_none());
    }

    #[tokio::test]
    async fn lru_eviction_when_at_capacity() {
        let clock = FakeClock::new(0);
        let cache: Cache<&str, i32> = Cache::new(clock.clone(), 2);
        cache.set("a", 1, None).await;
        clock.advance(1);
        cache.set("b", 2, None).await;
        clock.advance(1);
        cache.get(&"a").await; // touch a, making b the LRU
        clock.advance(1);
        cache.set("c", 3, None).await;
        assert!(cache.get(&"a").await.is_some());
        assert!(cache.get(&"b").await.is_none());
        assert!(cache.get(&"c").await.is_some());
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache: Cache<&str, i32> = Cache::new(FakeClock::new(0), 10);
        cache.get(&"k").await;
        cache.set("k", 1, None).await;
        cache.get(&"k").await;
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn concurrent_get_or_fetch_shares_one_fetcher_invocation() {
        let cache: Arc<Cache<&str, i32>> = Arc::new(Cache::new(FakeClock::new(0), 10));
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let invocations = Arc::clone(&invocations);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("k", None, || async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        42
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
