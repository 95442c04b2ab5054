//! Resolution cache
//!
//! Values resolved across the bridge are kept for a bounded time so repeated
//! renders of the same text do not cost a network round trip each. The source
//! of truth is live remote state, so nothing is cached indefinitely.

use super::{instant_after, TargetContext};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Cache key: placeholder key plus target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub key: String,
    pub target: TargetContext,
}

impl CacheKey {
    pub fn new(key: impl Into<String>, target: TargetContext) -> Self {
        Self {
            key: key.into(),
            target,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Bounded TTL cache of resolved placeholder values.
///
/// Expired entries are dropped lazily on lookup and by [`purge_expired`],
/// which the coordinator's maintenance task calls periodically. When the cache
/// is full, expired entries go first, then the entry closest to expiry.
///
/// [`purge_expired`]: ResolutionCache::purge_expired
pub struct ResolutionCache {
    entries: DashMap<CacheKey, CacheEntry>,
    capacity: usize,
    default_ttl: Duration,
}

impl ResolutionCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            default_ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live value. `None` is a cache miss.
    pub fn get(&self, key: &str, target: &TargetContext) -> Option<String> {
        let cache_key = CacheKey::new(key, target.clone());
        let now = Instant::now();

        let expired = match self.entries.get(&cache_key) {
            Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(&cache_key, |_, entry| !entry.is_live(now));
            tracing::trace!(key, %target, "Evicted expired placeholder value");
        }

        None
    }

    /// Insert or overwrite a value that expires `ttl` from now.
    ///
    /// A zero TTL stores nothing.
    pub fn put(&self, key: impl Into<String>, target: TargetContext, value: impl Into<String>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let cache_key = CacheKey::new(key, target);
        let now = Instant::now();

        if !self.entries.contains_key(&cache_key) && self.entries.len() >= self.capacity {
            self.make_room();
        }

        self.entries.insert(
            cache_key,
            CacheEntry {
                value: value.into(),
                expires_at: instant_after(now, ttl),
            },
        );
    }

    /// Insert with the cache's default TTL
    pub fn put_default(&self, key: impl Into<String>, target: TargetContext, value: impl Into<String>) {
        self.put(key, target, value, self.default_ttl);
    }

    /// Drop one entry immediately
    pub fn invalidate(&self, key: &str, target: &TargetContext) -> bool {
        self.entries
            .remove(&CacheKey::new(key, target.clone()))
            .is_some()
    }

    /// Drop every entry cached for `target`, e.g. when the player disconnects
    pub fn invalidate_target(&self, target: &TargetContext) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| &entry.key().target == target)
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count()
    }

    /// Remove every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter()
            .filter(|key| {
                self.entries
                    .remove_if(*key, |_, entry| !entry.is_live(now))
                    .is_some()
            })
            .count()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&self) {
        let purged = self.purge_expired();
        if purged > 0 || self.entries.len() < self.capacity {
            return;
        }

        let soonest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = soonest {
            self.entries.remove(&key);
            tracing::debug!(
                key = %key.key,
                target = %key.target,
                remaining = self.entries.len(),
                "Placeholder cache full, evicted entry closest to expiry"
            );
        }
    }
}
