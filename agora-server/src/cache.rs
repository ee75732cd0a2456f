use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Entries carry an absolute expiry and are only dropped when a read finds
/// them stale. Meant for small per-user dashboards, not as a general cache.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: DashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.0 > now => return Some(entry.1.clone()),
            Some(_) => {}
            None => return None,
        }
        self.entries.remove_if(key, |_, (expires_at, _)| *expires_at <= now);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (Instant::now() + self.ttl, value));
    }

    pub fn get_or_try_insert_with<E>(&self, key: K, fetch: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = fetch()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
