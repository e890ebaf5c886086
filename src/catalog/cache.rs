//! Process-wide expiring cache.
//!
//! Read-mostly. Two requests that both miss will both recompute and the
//! last one to `set` wins, which is fine for deterministic values.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug)]
pub struct ExpiringCache<V> {
    entries: RwLock<HashMap<&'static str, Entry<V>>>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Live value under `key`, if any.
    pub fn get(&self, key: &'static str) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            trace!(key, "cache entry expired");
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, key: &'static str, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key, Entry { value, expires_at });
    }

    pub fn delete(&self, key: &'static str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key).is_some()
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_delete() {
        let cache = ExpiringCache::new();
        assert_eq!(cache.get("k"), None::<u32>);
        cache.set("k", 7, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(7));
        cache.set("k", 8, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(8));
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = ExpiringCache::new();
        cache.set("k", "v", Duration::ZERO);
        assert_eq!(cache.get("k"), None);
    }
}
