//! TTL key/value cache fronted by a Bloom filter.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use super::BloomFilter;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, lifetime: Duration, now: Instant) -> bool {
        now.duration_since(self.created) > lifetime
    }
}

/// Bounded key/value store with lazy expiry.
///
/// Lookups first consult the Bloom filter, so a key that was never inserted
/// is rejected without taking the map lock. The filter and the map have
/// independent locks; a lookup may see a filter slightly ahead of or behind
/// the map, which can only cost an extra map lookup, never a missed hit.
///
/// Capacity is enforced by expiry: when the map is full, entries older than
/// the lifetime are swept before inserting.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use imagecapture_core::cache::Cache;
///
/// let cache = Cache::new(128, Duration::from_secs(60));
/// cache.set("kitten", 42_usize);
/// assert_eq!(cache.get("kitten"), Some(42));
/// assert_eq!(cache.get("puppy"), None);
/// ```
#[derive(Debug)]
pub struct Cache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    bloom: BloomFilter,
    max_size: usize,
    lifetime: Duration,
}

impl<V: Clone> Cache<V> {
    /// Creates a cache holding about `max_size` entries for `lifetime` each.
    #[must_use]
    pub fn new(max_size: usize, lifetime: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(max_size)),
            bloom: BloomFilter::with_capacity(max_size),
            max_size,
            lifetime,
        }
    }

    /// Configured entry lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Inserts or replaces `key`.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_size {
            let before = entries.len();
            let now = Instant::now();
            entries.retain(|_, entry| !entry.is_expired(self.lifetime, now));
            debug!(
                removed = before - entries.len(),
                remaining = entries.len(),
                "cache full, swept expired entries"
            );
        }
        self.bloom.add(&key);
        entries.insert(
            key,
            CacheEntry {
                value,
                created: Instant::now(),
            },
        );
    }

    /// Returns the value for `key` if present and not expired.
    ///
    /// Expired entries are left in place; they are removed by the next sweep.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.bloom.contains(key) {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        if entry.is_expired(self.lifetime, Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Removes every entry and resets the Bloom filter.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        self.bloom.clear();
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
