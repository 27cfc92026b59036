//! Adaptive polling scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::cache::store::unix_millis;
use crate::cache::{CacheEntry, Fingerprint};
use crate::config::PollingConfig;
use crate::gate::RequestGate;
use crate::observability::metrics;
use crate::resilience::retries::{classify, FailureAction};
use crate::resilience::DelayPolicy;
use crate::scheduler::entry::{KeyStatus, PollConfig, PollEntry};
use crate::scheduler::events::{EventHub, PollEvent};
use crate::transport::{FetchResult, Transport};

const EVENT_CAPACITY: usize = 256;

/// Introspection view of the whole scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub visible: bool,
    pub cache_entries: usize,
    pub in_flight: usize,
    pub keys: Vec<KeyStatus>,
}

/// Owns every polled key. Clones share the same state.
///
/// Timers hold only a weak reference, so dropping the last handle stops all
/// polling. Every method that schedules work must run inside a Tokio runtime.
pub struct PollingScheduler<P: Transport> {
    inner: Arc<Inner<P>>,
}

impl<P: Transport> Clone for PollingScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<P: Transport> {
    transport: Arc<P>,
    gate: RequestGate<P::Payload>,
    policy: DelayPolicy,
    retry_attempts: u32,
    throttled_per_attempt: u32,
    default_ttl: Duration,
    visible: AtomicBool,
    generations: AtomicU64,
    entries: Mutex<HashMap<String, PollEntry>>,
    last_data: DashMap<String, CacheEntry<P::Payload>>,
    events: EventHub<P::Payload>,
}

impl<P: Transport> PollingScheduler<P> {
    pub fn new(
        transport: Arc<P>,
        gate: RequestGate<P::Payload>,
        config: &PollingConfig,
        default_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                gate,
                policy: DelayPolicy::from(config),
                retry_attempts: config.retry_attempts,
                throttled_per_attempt: config.throttled_per_attempt.max(1),
                default_ttl,
                visible: AtomicBool::new(true),
                generations: AtomicU64::new(0),
                entries: Mutex::new(HashMap::new()),
                last_data: DashMap::new(),
                events: EventHub::new(EVENT_CAPACITY),
            }),
        }
    }

    pub fn gate(&self) -> &RequestGate<P::Payload> {
        &self.inner.gate
    }

    pub fn transport(&self) -> &Arc<P> {
        &self.inner.transport
    }

    pub fn events(&self) -> &EventHub<P::Payload> {
        &self.inner.events
    }

    /// Register `key` (replacing any previous registration) and poll it now.
    pub fn start_polling(&self, key: impl Into<String>, config: PollConfig) {
        let key = key.into();
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            key = %key,
            interval_ms = config.interval.as_millis() as u64,
            critical = config.critical,
            "Polling started"
        );

        // Replacing the entry drops the old one, which aborts its timer.
        self.inner
            .entries()
            .insert(key.clone(), PollEntry::new(config, generation));
        self.inner.arm(&key, generation, Duration::ZERO);
    }

    /// Re-register a key with its current configuration. Resumes paused keys.
    pub fn restart(&self, key: &str) -> bool {
        let config = self.inner.entries().get(key).map(|e| e.config.clone());
        match config {
            Some(config) => {
                self.start_polling(key, config);
                true
            }
            None => false,
        }
    }

    /// Remove `key`. An in-flight fetch completes but is not acted upon.
    pub fn stop_polling(&self, key: &str) -> bool {
        let removed = self.inner.entries().remove(key);
        match removed {
            Some(_) => {
                tracing::info!(key, "Polling stopped");
                true
            }
            None => false,
        }
    }

    /// Same as re-registering with a new interval.
    pub fn update_interval(&self, key: &str, interval: Duration) -> bool {
        let config = self.inner.entries().get(key).map(|e| PollConfig {
            interval,
            ..e.config.clone()
        });
        match config {
            Some(config) => {
                self.start_polling(key, config);
                true
            }
            None => false,
        }
    }

    /// Last successful payload for `key`, regardless of freshness.
    pub fn get_last_data(&self, key: &str) -> Option<CacheEntry<P::Payload>> {
        self.inner.last_data.get(key).map(|e| e.value().clone())
    }

    pub fn set_visible(&self, visible: bool) {
        self.inner.set_visible(visible);
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::SeqCst)
    }

    /// Follow a visibility signal until its sender goes away.
    pub fn watch_visibility(&self, mut signal: watch::Receiver<bool>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while signal.changed().await.is_ok() {
                let visible = *signal.borrow_and_update();
                match weak.upgrade() {
                    Some(inner) => inner.set_visible(visible),
                    None => break,
                }
            }
        })
    }

    /// Delay the next timer for `key` would use, without jitter.
    pub fn planned_delay(&self, key: &str) -> Option<Duration> {
        let visible = self.is_visible();
        self.inner.entries().get(key).map(|e| {
            self.inner
                .policy
                .planned_delay(e.config.interval, e.error_count, visible, e.config.critical)
        })
    }

    pub fn key_status(&self, key: &str) -> Option<KeyStatus> {
        self.inner
            .entries()
            .get(key)
            .map(|e| e.status(key, self.inner.last_data.contains_key(key)))
    }

    pub fn debug_snapshot(&self) -> SchedulerSnapshot {
        let mut keys: Vec<KeyStatus> = self
            .inner
            .entries()
            .iter()
            .map(|(key, e)| e.status(key, self.inner.last_data.contains_key(key)))
            .collect();
        keys.sort_by(|a, b| a.key.cmp(&b.key));

        SchedulerSnapshot {
            visible: self.is_visible(),
            cache_entries: self.inner.gate.cache().len(),
            in_flight: self.inner.gate.in_flight_count(),
            keys,
        }
    }

    /// Drop the request cache and every last-data snapshot. Fetches issued
    /// before the clear are discarded and their keys fire again.
    pub fn clear_cache(&self) {
        let _entries = self.inner.entries();
        self.inner.gate.clear();
        self.inner.last_data.clear();
    }

    /// Cancel every timer and forget every key.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.inner.entries().drain().collect();
        let count = drained.len();
        drop(drained);
        tracing::info!(keys = count, "Polling scheduler stopped");
        count
    }
}

impl<P: Transport> Inner<P> {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, PollEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ttl_for(&self, config: &PollConfig) -> Duration {
        // An inherited TTL never outlives half the interval, so the next fire refreshes.
        config
            .ttl
            .unwrap_or_else(|| self.default_ttl.min(config.interval / 2))
    }

    fn set_visible(self: &Arc<Self>, visible: bool) {
        let was = self.visible.swap(visible, Ordering::SeqCst);
        if was == visible {
            return;
        }
        tracing::info!(visible, "Visibility changed");
        if visible {
            self.catch_up();
        }
    }

    /// Fire every idle key now instead of waiting out a hidden-mode delay.
    /// Keys holding off for a rate-limit or circuit hint keep their timer.
    fn catch_up(self: &Arc<Self>) {
        let mut entries = self.entries();
        let mut fired = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.is_idle() && entry.throttle_streak == 0 {
                self.schedule(key, entry, Duration::ZERO);
                fired += 1;
            }
        }
        if fired > 0 {
            tracing::debug!(keys = fired, "Catching up idle keys");
        }
    }

    /// Schedule the next fire of `key`, replacing any pending timer.
    fn arm(self: &Arc<Self>, key: &str, generation: u64, delay: Duration) {
        let mut entries = self.entries();
        if let Some(entry) = entries
            .get_mut(key)
            .filter(|e| e.generation == generation && e.enabled && !e.firing)
        {
            self.schedule(key, entry, delay);
        }
    }

    fn schedule(self: &Arc<Self>, key: &str, entry: &mut PollEntry, delay: Duration) {
        entry.cancel_timer();
        entry.armed += 1;

        let weak = Arc::downgrade(self);
        let owned_key = key.to_string();
        let (generation, ticket) = (entry.generation, entry.armed);
        entry.timer = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire(owned_key, generation, ticket).await;
            }
        }));
        entry.next_fire_at = Some(Instant::now() + delay);
    }

    async fn fire(self: Arc<Self>, key: String, generation: u64, ticket: u64) {
        let (endpoint, ttl, floor, epoch) = {
            let mut entries = self.entries();
            // A replaced timer that already woke must not start a second fetch.
            let Some(entry) = entries.get_mut(&key).filter(|e| {
                e.generation == generation && e.armed == ticket && e.enabled && !e.firing
            }) else {
                return;
            };
            // Detach from the timer so stop_polling can't abort the fetch.
            entry.timer = None;
            entry.next_fire_at = None;
            entry.firing = true;
            (
                entry.config.endpoint.clone(),
                self.ttl_for(&entry.config),
                self.gate.floor_for(&entry.config.endpoint),
                self.gate.epoch(),
            )
        };

        let transport = self.transport.clone();
        let result = self
            .gate
            .fetch_entry(Fingerprint::of(&endpoint), ttl, floor, move || async move {
                transport.perform(&endpoint).await
            })
            .await;

        self.settle(&key, generation, epoch, result);
    }

    fn settle(
        self: &Arc<Self>,
        key: &str,
        generation: u64,
        epoch: u64,
        result: FetchResult<CacheEntry<P::Payload>>,
    ) {
        let visible = self.visible.load(Ordering::SeqCst);
        let timestamp_ms = unix_millis();
        let mut clear_cache = false;

        let (event, next) = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(key).filter(|e| e.generation == generation) else {
                tracing::debug!(key, "Poll settled after its key was replaced or stopped");
                return;
            };
            entry.firing = false;

            if self.gate.epoch() != epoch {
                tracing::debug!(key, "Poll settled across a cache clear, firing again");
                drop(entries);
                self.arm(key, generation, Duration::ZERO);
                return;
            }

            let interval = entry.config.interval;
            let critical = entry.config.critical;

            match result {
                Ok(fetched) => {
                    entry.error_count = 0;
                    entry.throttle_streak = 0;
                    entry.last_error = None;
                    let payload = fetched.payload.clone();
                    self.last_data.insert(key.to_string(), fetched);
                    metrics::record_poll(key, "success");
                    tracing::trace!(key, "Poll succeeded");

                    let delay = self.policy.next_delay(interval, 0, visible, critical);
                    let event = PollEvent::Data {
                        key: key.to_string(),
                        payload,
                        timestamp_ms,
                    };
                    (event, Some(delay))
                }
                Err(error) => {
                    let delay = match classify(&error) {
                        FailureAction::Backoff => {
                            entry.error_count += 1;
                            entry.throttle_streak = 0;
                            (entry.error_count < self.retry_attempts).then(|| {
                                self.policy
                                    .next_delay(interval, entry.error_count, visible, critical)
                            })
                        }
                        FailureAction::Pause => {
                            clear_cache = true;
                            None
                        }
                        FailureAction::Hint(retry_after) => {
                            entry.throttle_streak += 1;
                            if entry.throttle_streak % self.throttled_per_attempt == 0 {
                                entry.error_count += 1;
                            }
                            (entry.error_count < self.retry_attempts).then(|| {
                                self.policy.hinted_delay(retry_after, entry.throttle_streak)
                            })
                        }
                    };

                    let paused = delay.is_none();
                    if paused {
                        entry.enabled = false;
                        metrics::record_poll(key, "paused");
                        tracing::warn!(
                            key,
                            error = %error,
                            error_count = entry.error_count,
                            "Polling paused"
                        );
                    } else {
                        metrics::record_poll(key, "error");
                        tracing::warn!(
                            key,
                            error = %error,
                            error_count = entry.error_count,
                            retry_in_ms = delay.map(|d| d.as_millis() as u64),
                            "Poll failed"
                        );
                    }

                    entry.last_error = Some(error.clone());
                    let event = PollEvent::Error {
                        key: key.to_string(),
                        error,
                        paused,
                        timestamp_ms,
                    };
                    (event, delay)
                }
            }
        };

        if clear_cache {
            self.gate.clear();
        }
        self.events.emit(event);
        if let Some(delay) = next {
            self.arm(key, generation, delay);
        }
    }
}
