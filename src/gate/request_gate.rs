//! Cache-first, de-duplicating wrapper around transport calls.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::cache::{Cache, CacheEntry, Fingerprint};
use crate::config::GateConfig;
use crate::gate::Throttle;
use crate::observability::metrics;
use crate::transport::{Endpoint, FetchResult};

type SharedFetch<T> = Shared<BoxFuture<'static, FetchResult<CacheEntry<T>>>>;

/// An outstanding call and the cache epoch it was issued under.
struct InFlight<T> {
    epoch: u64,
    call: SharedFetch<T>,
}

/// Owns the cache and the in-flight map; the only path to the network.
pub struct RequestGate<T> {
    cache: Cache<T>,
    in_flight: Arc<DashMap<Fingerprint, InFlight<T>>>,
    /// Bumped by `clear()`. Results issued under an older epoch are never stored.
    epoch: Arc<RwLock<u64>>,
    throttle: Throttle,
    config: GateConfig,
}

impl<T> Clone for RequestGate<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            in_flight: self.in_flight.clone(),
            epoch: self.epoch.clone(),
            throttle: self.throttle.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RequestGate<T> {
    pub fn new(config: GateConfig) -> Self {
        Self {
            cache: Cache::new(),
            in_flight: Arc::new(DashMap::new()),
            epoch: Arc::new(RwLock::new(0)),
            throttle: Throttle::new(),
            config,
        }
    }

    pub fn cache(&self) -> &Cache<T> {
        &self.cache
    }

    /// Number of clears so far.
    pub fn epoch(&self) -> u64 {
        *self.epoch.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Minimum spacing for calls to `endpoint`.
    pub fn floor_for(&self, endpoint: &Endpoint) -> Duration {
        if endpoint.sensitive {
            Duration::from_millis(self.config.sensitive_min_interval_ms)
        } else {
            Duration::from_millis(self.config.min_interval_ms)
        }
    }

    /// Serve from cache, join an identical in-flight call, or issue a new one
    /// under the default floor.
    pub async fn execute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        ttl: Duration,
        perform: F,
    ) -> FetchResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let floor = Duration::from_millis(self.config.min_interval_ms);
        self.execute_with_floor(fingerprint, ttl, floor, perform).await
    }

    /// As [`execute`](Self::execute) with an explicit min-interval floor.
    pub async fn execute_with_floor<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        ttl: Duration,
        floor: Duration,
        perform: F,
    ) -> FetchResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        self.fetch_entry(fingerprint, ttl, floor, perform)
            .await
            .map(|entry| entry.payload)
    }

    /// As [`execute_with_floor`](Self::execute_with_floor), keeping the storage
    /// time of a payload served from cache.
    pub async fn fetch_entry<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        ttl: Duration,
        floor: Duration,
        perform: F,
    ) -> FetchResult<CacheEntry<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        if let Some(entry) = self.cache.fresh_entry(&fingerprint) {
            metrics::record_gate_result("cache_hit");
            tracing::trace!(fingerprint = %fingerprint, "Served from cache");
            return Ok(entry);
        }

        let shared = {
            // Held until the call is registered so clear() can't slip in between.
            let guard = self.epoch.read().unwrap_or_else(|e| e.into_inner());
            let epoch = *guard;
            match self.in_flight.entry(fingerprint.clone()) {
                Entry::Occupied(e) => {
                    metrics::record_gate_result("joined");
                    tracing::debug!(fingerprint = %fingerprint, "Joining in-flight request");
                    e.get().call.clone()
                }
                Entry::Vacant(v) => {
                    metrics::record_gate_result("issued");
                    let call = self.issue(fingerprint.clone(), epoch, ttl, floor, perform);
                    v.insert(InFlight {
                        epoch,
                        call: call.clone(),
                    });
                    call
                }
            }
        };
        metrics::record_inflight(self.in_flight.len());

        shared.await
    }

    fn issue<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        epoch: u64,
        ttl: Duration,
        floor: Duration,
        perform: F,
    ) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let in_flight = self.in_flight.clone();
        let current = self.epoch.clone();
        let throttle = self.throttle.clone();

        async move {
            throttle.wait(&fingerprint, floor).await;
            let result = perform().await.map(|payload| CacheEntry::new(payload, ttl));

            if let Ok(entry) = &result {
                if !ttl.is_zero() {
                    let guard = current.read().unwrap_or_else(|e| e.into_inner());
                    if *guard == epoch {
                        cache.insert(fingerprint.clone(), entry.clone());
                    } else {
                        tracing::debug!(fingerprint = %fingerprint, "Discarding result issued before a cache clear");
                    }
                }
            }
            in_flight.remove_if(&fingerprint, |_, f| f.epoch == epoch);
            metrics::record_inflight(in_flight.len());

            if let Err(e) = &result {
                tracing::debug!(fingerprint = %fingerprint, error = %e, "Request failed");
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Calls currently outstanding.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Drop cached payloads and forget outstanding calls; called when the
    /// caller's identity changes. Calls already issued still resolve for
    /// their callers but never populate the cache.
    pub fn clear(&self) {
        let mut epoch = self.epoch.write().unwrap_or_else(|e| e.into_inner());
        *epoch += 1;
        self.in_flight.clear();
        self.cache.clear();
        metrics::record_inflight(0);
        tracing::info!(epoch = *epoch, "Request cache cleared");
    }

    /// Evict expired cache entries and stale throttle slots.
    pub fn sweep(&self) -> usize {
        let horizon = Duration::from_millis(
            self.config
                .min_interval_ms
                .max(self.config.sensitive_min_interval_ms),
        );
        self.throttle.prune(horizon);
        self.cache.sweep()
    }

    /// Run `sweep()` every `interval` until shutdown.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = gate.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = gate.cache.len(), "Cache sweep");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Cache sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}
