//! TTL cache keyed by request fingerprint.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::Fingerprint;
use crate::observability::metrics;

/// One cached payload.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    /// Monotonic storage time, used for freshness.
    pub stored_at: Instant,
    /// Wall-clock storage time in milliseconds since the epoch.
    pub stored_at_ms: u64,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, ttl: Duration) -> Self {
        Self {
            payload,
            stored_at: Instant::now(),
            stored_at_ms: unix_millis(),
            ttl,
        }
    }

    /// Fresh iff `now - stored_at < ttl`.
    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }
}

/// Serializable view of an entry, for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub stored_at_ms: u64,
    pub age_ms: u64,
    pub ttl_ms: u64,
    pub fresh: bool,
}

impl<T> From<&CacheEntry<T>> for CacheEntryInfo {
    fn from(entry: &CacheEntry<T>) -> Self {
        Self {
            stored_at_ms: entry.stored_at_ms,
            age_ms: entry.age().as_millis() as u64,
            ttl_ms: entry.ttl.as_millis() as u64,
            fresh: entry.is_fresh(),
        }
    }
}

/// A thread-safe TTL cache. Clones share the same storage.
#[derive(Debug)]
pub struct Cache<T> {
    inner: Arc<DashMap<Fingerprint, CacheEntry<T>>>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Clone> Cache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the payload only while it is fresh. Never evicts.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<T> {
        self.inner
            .get(fingerprint)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.payload.clone())
    }

    /// Fresh entry with its original storage time.
    pub fn fresh_entry(&self, fingerprint: &Fingerprint) -> Option<CacheEntry<T>> {
        self.inner
            .get(fingerprint)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.value().clone())
    }

    /// Raw snapshot, stale or not.
    pub fn entry(&self, fingerprint: &Fingerprint) -> Option<CacheEntry<T>> {
        self.inner.get(fingerprint).map(|r| r.value().clone())
    }

    pub fn contains_fresh(&self, fingerprint: &Fingerprint) -> bool {
        self.inner
            .get(fingerprint)
            .map(|entry| entry.is_fresh())
            .unwrap_or(false)
    }

    /// Unconditional overwrite; resets the storage time.
    pub fn set(&self, fingerprint: Fingerprint, payload: T, ttl: Duration) {
        self.insert(fingerprint, CacheEntry::new(payload, ttl));
    }

    /// Store a prepared entry as is.
    pub fn insert(&self, fingerprint: Fingerprint, entry: CacheEntry<T>) {
        self.inner.insert(fingerprint, entry);
        metrics::record_cache_size(self.inner.len());
    }

    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.inner.remove(fingerprint).is_some();
        metrics::record_cache_size(self.inner.len());
        removed
    }

    /// Evict every expired entry. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.is_fresh());
        let evicted = before.saturating_sub(self.inner.len());
        metrics::record_cache_size(self.inner.len());
        evicted
    }

    /// Drop everything. Called when the caller's identity changes.
    pub fn clear(&self) {
        self.inner.clear();
        metrics::record_cache_size(0);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
