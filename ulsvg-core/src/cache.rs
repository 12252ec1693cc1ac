//! Cache Service - Explicit Key/Value Store
//!
//! Memoizes region, layout and document computations. Instances are owned
//! by the caller and handed to components; there is no process-wide cache.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted_count: usize,
}

/// Key/value store contract shared by in-memory and persistent backends.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// `ttl = None` keeps the entry until cleared.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    /// Drops expired entries.
    fn cleanup(&self) -> CleanupReport;

    fn clear(&self);
}

pub type SharedCache = Arc<dyn CacheStore>;

pub fn get_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Option<T> {
    store.get(key).and_then(|v| serde_json::from_value(v).ok())
}

pub fn set_json<T: Serialize>(store: &dyn CacheStore, key: &str, value: &T, ttl: Option<Duration>) {
    if let Ok(v) = serde_json::to_value(value) {
        store.set(key, v, ttl);
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |t| t <= now)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCache {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if entry.expired(Utc::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        if let Ok(mut entries) = self.entries.lock() {
            // a TTL past the representable range never expires
            let expires_at = ttl.and_then(|d| Utc::now().checked_add_signed(d));
            entries.insert(key.to_string(), CacheEntry { value, expires_at });
        }
    }

    fn cleanup(&self) -> CleanupReport {
        let Ok(mut entries) = self.entries.lock() else {
            return CleanupReport { deleted_count: 0 };
        };
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, e| !e.expired(now));
        let deleted_count = before - entries.len();
        if deleted_count > 0 {
            debug!("cache cleanup removed {} expired entries", deleted_count);
        }
        CleanupReport { deleted_count }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_set_roundtrip() {
        let cache = MemoryCache::new();
        cache.set("a", json!({"x": 1}), None);
        assert_eq!(cache.get("a"), Some(json!({"x": 1})));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_expired_entries_hidden_and_cleaned() {
        let cache = MemoryCache::new();
        cache.set("old", json!(1), Some(Duration::zero()));
        cache.set("fresh", json!(2), Some(Duration::hours(1)));
        cache.set("forever", json!(3), None);
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.cleanup().deleted_count, 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.cleanup().deleted_count, 0);
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let cache = MemoryCache::new();
        cache.set("far", json!(1), Some(Duration::MAX));
        assert_eq!(cache.get("far"), Some(json!(1)));
        assert_eq!(cache.cleanup().deleted_count, 0);
    }

    #[test]
    fn test_typed_helpers() {
        let cache = MemoryCache::new();
        set_json(&cache, "v", &vec![1u32, 2, 3], None);
        let v: Vec<u32> = get_json(&cache, "v").unwrap();
        assert_eq!(v, vec![1, 2, 3]);
        let wrong: Option<String> = get_json(&cache, "v");
        assert!(wrong.is_none());
    }
}
