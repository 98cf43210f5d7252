//! Fixed-capacity TTL cache shared by every upstream read path.
//!
//! Entries expire a fixed `ttl` after insertion. When full, the least
//! recently used entry is evicted. Concurrent callers may race to fill the
//! same key; the worst case is a redundant upstream call.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    pub capacity: usize,
    /// Time-to-live from insertion, in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 5_000,
            ttl_secs: 300,
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Recency order, oldest first; stale generations are skipped on eviction.
    order: VecDeque<(K, u64)>,
    next_generation: u64,
}

impl<K: Eq + Hash, V> Inner<K, V> {
    /// Drop order slots left behind by reads, expiries and replacements.
    fn compact(&mut self, capacity: usize) {
        if self.order.len() > capacity * 2 {
            let Inner { entries, order, .. } = self;
            order.retain(|(k, g)| entries.get(k).is_some_and(|e| e.generation == *g));
        }
    }
}

/// Thread-safe bounded TTL cache.
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity(config.capacity, Duration::from_secs(config.ttl_secs))
    }

    pub fn with_capacity(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_generation: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key`, marking it most recently used. An expired entry counts
    /// as a miss and is removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();
        if inner.entries.get(key).is_some_and(|e| e.expires_at <= now) {
            inner.entries.remove(key);
        }
        let mut found = None;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.generation = inner.next_generation;
            inner.next_generation += 1;
            inner.order.push_back((key.clone(), entry.generation));
            found = Some(entry.value.clone());
        }
        inner.compact(self.capacity);
        drop(guard);

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert or replace `key`, evicting the least recently used entry when full.
    pub fn set(&self, key: K, value: V) {
        let mut inner = self.lock();
        let generation = inner.next_generation;
        inner.next_generation += 1;

        let replacing = inner.entries.contains_key(&key);
        if !replacing {
            while inner.entries.len() >= self.capacity {
                let Some((old_key, old_generation)) = inner.order.pop_front() else {
                    break;
                };
                let live = inner
                    .entries
                    .get(&old_key)
                    .is_some_and(|e| e.generation == old_generation);
                if live {
                    inner.entries.remove(&old_key);
                }
            }
        }

        inner.entries.insert(
            key.clone(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
                generation,
            },
        );
        inner.order.push_back((key, generation));
        inner.compact(self.capacity);
    }

    /// Number of stored entries (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<K, V>> {
        // A poisoned lock only means another thread panicked mid-update;
        // the map itself is still structurally valid.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_set() {
        let cache = BoundedCache::with_capacity(4, Duration::from_secs(60));
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let cache = BoundedCache::with_capacity(2, Duration::from_secs(60));
        cache.set(1, "one");
        cache.set(2, "two");
        cache.set(3, "three");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("two"));
        assert_eq!(cache.get(&3), Some("three"));
    }

    #[test]
    fn reading_an_entry_protects_it_from_eviction() {
        let cache = BoundedCache::with_capacity(2, Duration::from_secs(60));
        cache.set(1, "one");
        cache.set(2, "two");
        assert_eq!(cache.get(&1), Some("one"));
        cache.set(3, "three");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("one"));
        assert_eq!(cache.get(&3), Some("three"));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache = BoundedCache::with_capacity(2, Duration::from_secs(60));
        cache.set(1, 10);
        cache.set(2, 20);
        cache.set(1, 11);
        assert_eq!(cache.len(), 2);
        // Key 1's first slot is stale; key 2 is now the least recently used.
        cache.set(3, 30);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(11));
        assert_eq!(cache.get(&3), Some(30));
    }

    #[test]
    fn reads_reorder_eviction() {
        let cache = BoundedCache::with_capacity(2, Duration::from_secs(60));
        cache.set(1, 10);
        cache.set(2, 20);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&2), Some(20));
        cache.set(3, 30);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss_and_removed() {
        let cache = BoundedCache::with_capacity(4, Duration::from_secs(10));
        cache.set("k", 7);
        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&"k"), Some(7));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn order_queue_stays_bounded() {
        let cache = BoundedCache::with_capacity(3, Duration::from_secs(60));
        for i in 0..100 {
            cache.set(i % 2, i);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.lock().order.len() <= 6);
    }
}
