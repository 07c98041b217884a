use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted: Instant,
}

/// Path-keyed cache whose entries expire `ttl` after insertion.
///
/// Expired entries are dropped lazily on lookup. There is no size bound.
#[derive(Debug)]
pub struct ObjectCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ObjectCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Adds or replaces `key`, restarting its clock.
    pub fn put(&self, key: &str, value: V) {
        let entry = CacheEntry {
            value,
            inserted: Instant::now(),
        };
        self.entries().insert(key.to_string(), entry);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted.elapsed() >= self.ttl,
        };
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn delete(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Removes `key` and every key below it (`key/...`).
    pub fn delete_tree(&self, key: &str) {
        let prefix = format!("{key}/");
        self.entries()
            .retain(|k, _| k != key && !k.starts_with(&prefix));
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<V: Clone> Default for ObjectCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
