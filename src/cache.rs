// src/cache.rs
//! In-memory, thread-safe TTL cache.
//! Constructed explicitly and injected into the service; there is no
//! process-wide cache state anywhere in this crate.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Capacity-bounded map whose entries expire after a fixed TTL.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    inner: Arc<Mutex<HashMap<K, (Instant, V)>>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity,
        }
    }

    /// Returns the cached value if present and not expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        match map.get(key) {
            Some((inserted, value)) if now.duration_since(*inserted) < self.ttl => {
                Some(value.clone())
            }
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts a value, evicting expired entries first and then the oldest
    /// entry if the cache is still at capacity.
    pub async fn insert(&self, key: K, value: V) {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        map.retain(|_, (inserted, _)| now.duration_since(*inserted) < self.ttl);
        if map.len() >= self.capacity && !map.contains_key(&key) {
            let oldest = map
                .iter()
                .min_by_key(|(_, (inserted, _))| *inserted)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                map.remove(&oldest);
            }
        }
        map.insert(key, (now, value));
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_inserted_value() {
        let cache = TtlCache::new(Duration::from_secs(60), 4);
        cache.insert("a".to_string(), 1u32).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"b".to_string()).await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let cache = TtlCache::new(Duration::from_millis(10), 4);
        cache.insert("a".to_string(), 1u32).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), 1u32).await;
        cache.insert("b".to_string(), 2u32).await;
        cache.insert("c".to_string(), 3u32).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"a".to_string()).await, None);
        assert_eq!(cache.get(&"c".to_string()).await, Some(3));
    }
}
