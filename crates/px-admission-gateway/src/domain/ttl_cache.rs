//! Time-bounded concurrent cache.
//!
//! Entries are immutable once inserted and replaced wholesale. Expired entries
//! are evicted lazily when read, and in bulk by [`TtlCache::purge_expired`].
//! The clock is injected so expiry can be tested without sleeping.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::ports::outbound::TimeSource;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Clock seconds when the value was stored.
    pub fetched_at: u64,
    pub expires_at: u64,
}

pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn TimeSource>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Return a live value, evicting it first if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let live = {
            let entry = self.entries.get(key)?;
            (now < entry.expires_at).then(|| entry.value.clone())
        };
        if live.is_none() {
            // Another writer may have refreshed the entry since the read.
            self.entries.remove_if(key, |_, e| now >= e.expires_at);
        }
        live
    }

    /// Store a value, replacing any previous entry for the key.
    pub fn insert(&self, key: K, value: V) {
        let fetched_at = self.clock.now();
        let entry = CacheEntry {
            value,
            fetched_at,
            expires_at: fetched_at.saturating_add(self.ttl.as_secs()),
        };
        self.entries.insert(key, entry);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| now < e.expires_at);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Purged expired cache entries");
        }
        removed
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
