//! Private TTL cache shared by every adapter in this crate.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A simple TTL-expiring cache keyed by lookup input, as described in §4.7:
/// "cache values include a timestamp for TTL expiration". Stale entries are
/// lazily dropped on next lookup rather than swept eagerly.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache that expires entries after `ttl`. `None` means entries
    /// never expire (e.g. the GeoIP adapter's file-local MMDB reader).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Return a cached value if present and not yet expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if let Some(ttl) = self.ttl {
            if entry.inserted_at.elapsed() > ttl {
                return None;
            }
        }
        Some(entry.value.clone())
    }

    /// Insert or refresh a value.
    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of entries currently held, including any that are stale but
    /// not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Shared cache handle, cheap to clone.
pub type SharedCache<K, V> = Arc<TtlCache<K, V>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_entry_hits() {
        let cache: TtlCache<String, u32> = TtlCache::new(Some(Duration::from_secs(60)));
        cache.insert("a".to_string(), 1).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    }

    #[tokio::test]
    async fn expired_entry_misses() {
        let cache: TtlCache<String, u32> = TtlCache::new(Some(Duration::from_millis(1)));
        cache.insert("a".to_string(), 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn no_ttl_never_expires() {
        let cache: TtlCache<String, u32> = TtlCache::new(None);
        cache.insert("a".to_string(), 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    }

    #[tokio::test]
    async fn missing_key_misses() {
        let cache: TtlCache<String, u32> = TtlCache::new(None);
        assert_eq!(cache.get(&"missing".to_string()).await, None);
    }
}
