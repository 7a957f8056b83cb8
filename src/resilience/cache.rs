// Bounded, insertion-ordered, time-boxed result cache

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    timestamp: Instant,
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion order, oldest first; re-insertion moves a key to the back
    order: VecDeque<String>,
}

/// Insertion-ordered mapping capped at a maximum entry count.
///
/// `set` evicts the oldest entry on overflow; `clear_expired` sweeps entries
/// past the TTL without waiting for capacity pressure; `clear` invalidates
/// wholesale after any control operation.
#[derive(Debug)]
pub struct TtlCache<V> {
    max_entries: usize,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Fetch a value no older than `ttl`
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let inner = self.inner.lock().expect("cache lock");
        inner
            .entries
            .get(key)
            .filter(|entry| entry.timestamp.elapsed() < ttl)
            .map(|entry| entry.data.clone())
    }

    pub fn set(&self, key: &str, data: V) {
        let mut inner = self.inner.lock().expect("cache lock");

        if inner.entries.contains_key(key) {
            inner.order.retain(|k| k != key);
        }
        inner.order.push_back(key.to_string());
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                timestamp: Instant::now(),
            },
        );

        while inner.entries.len() > self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                tracing::debug!("cache evicted oldest entry '{}'", oldest);
            } else {
                break;
            }
        }
    }

    /// Drop entries whose timestamp is older than `ttl`
    pub fn clear_expired(&self, ttl: Duration) {
        let mut inner = self.inner.lock().expect("cache lock");
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.timestamp.elapsed() >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
        }
        inner.order.retain(|k| !expired.contains(k));
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock");
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
