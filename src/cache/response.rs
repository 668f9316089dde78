//! Bounded LRU response cache.
//!
//! [`ResponseCache`] stores generated responses keyed by request
//! [`Fingerprint`]. It sits in the [`Orchestrator`](crate::Orchestrator) in
//! front of provider selection: a hit bypasses selection, adapter calls and
//! provider statistics entirely.
//!
//! # Eviction
//!
//! Eviction is strictly least-recently-used across the whole cache: inserting
//! into a full cache evicts exactly the entry whose last `get` or `put` is
//! oldest. A global order cannot be kept across independently locked shards,
//! so the cache is a single `Mutex` around an [`lru::LruCache`]. The lock is
//! never held across an `.await`.
//!
//! # Expiry
//!
//! Entries never expire by age unless a TTL is configured. With a TTL, an
//! expired entry is reported as a miss and removed on the access that finds it.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;

use super::Fingerprint;
use crate::clock::{Clock, MonotonicClock};
use crate::types::GenerationResponse;
use crate::{Result, SkaldError};

/// Configuration for the response cache.
///
/// ```rust
/// # use skald::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 1,000. Zero disables caching.
    pub max_entries: usize,
    /// Optional time-to-live. Default: none (entries only leave by eviction).
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: None,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A cached response with its bookkeeping timestamps.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub response: GenerationResponse,
    pub inserted_at: Instant,
    pub last_access: Instant,
}

/// Concurrency-safe LRU cache of generation responses.
pub struct ResponseCache {
    inner: Mutex<LruCache<Fingerprint, CacheEntry>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    /// Create a cache reading time from `clock` (for TTL tests).
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        // A zero-capacity cache never stores; `put` returns before touching it.
        let bound = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(bound)),
            capacity: config.max_entries,
            ttl: config.ttl,
            clock,
        }
    }

    /// Look up a response, refreshing its recency.
    ///
    /// Returns `Ok(None)` on a miss or an expired entry.
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<GenerationResponse>> {
        let now = self.clock.now();
        let mut lru = self.lock()?;
        let expired = match lru.peek(fingerprint) {
            Some(entry) => self.is_expired(entry, now),
            None => return Ok(None),
        };
        if expired {
            lru.pop(fingerprint);
            return Ok(None);
        }
        Ok(lru.get_mut(fingerprint).map(|entry| {
            entry.last_access = now;
            entry.response.clone()
        }))
    }

    /// Insert or replace a response, evicting the least-recently-used entry
    /// when the cache is full.
    ///
    /// Returns the evicted fingerprint, if any.
    pub fn put(
        &self,
        fingerprint: Fingerprint,
        response: GenerationResponse,
    ) -> Result<Option<Fingerprint>> {
        if self.capacity == 0 {
            return Ok(None);
        }
        let now = self.clock.now();
        let entry = CacheEntry {
            fingerprint,
            response,
            inserted_at: now,
            last_access: now,
        };
        // `push` hands back either the replaced value for the same key or
        // the evicted least-recently-used pair.
        let displaced = self.lock()?.push(fingerprint, entry);
        Ok(displaced
            .map(|(key, _)| key)
            .filter(|key| *key != fingerprint))
    }

    /// Inspect an entry without refreshing recency or applying TTL.
    pub fn peek(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.peek(fingerprint).cloned())
    }

    /// Remove a single entry.
    pub fn remove(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.lock()?.pop(fingerprint).is_some())
    }

    /// Number of entries currently held (expired entries not yet touched
    /// are still counted).
    pub fn len(&self) -> usize {
        self.lock().map(|lru| lru.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Evict all entries.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Fingerprints from most to least recently used.
    pub fn keys_by_recency(&self) -> Result<Vec<Fingerprint>> {
        Ok(self.lock()?.iter().map(|(key, _)| *key).collect())
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.inserted_at) >= ttl)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<Fingerprint, CacheEntry>>> {
        self.inner
            .lock()
            .map_err(|_| SkaldError::CacheUnavailable("cache lock poisoned".into()))
    }
}
