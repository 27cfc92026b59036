//! Per-key polling state.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PollSpec;
use crate::transport::{Endpoint, FetchError};

/// What to poll and how often.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub endpoint: Endpoint,
    /// Nominal delay between fires.
    pub interval: Duration,
    /// Critical keys keep full cadence while hidden.
    pub critical: bool,
    /// Cache TTL for fetched payloads; derived from the interval when unset.
    pub ttl: Option<Duration>,
}

impl PollConfig {
    pub fn new(endpoint: Endpoint, interval: Duration) -> Self {
        Self {
            endpoint,
            interval,
            critical: false,
            ttl: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl From<&PollSpec> for PollConfig {
    fn from(spec: &PollSpec) -> Self {
        Self {
            endpoint: spec.endpoint(),
            interval: spec.interval(),
            critical: spec.critical,
            ttl: spec.ttl_ms.map(Duration::from_millis),
        }
    }
}

pub(crate) struct PollEntry {
    pub config: PollConfig,
    /// Bumped on every (re)registration; stale timers compare against it.
    pub generation: u64,
    pub enabled: bool,
    pub error_count: u32,
    /// Consecutive rate-limited or circuit-open responses.
    pub throttle_streak: u32,
    /// A fetch for this key is outstanding.
    pub firing: bool,
    /// Bumped whenever a timer is scheduled; a timer only fires if it is the latest.
    pub armed: u64,
    pub next_fire_at: Option<Instant>,
    pub last_error: Option<FetchError>,
    pub timer: Option<JoinHandle<()>>,
}

impl PollEntry {
    pub fn new(config: PollConfig, generation: u64) -> Self {
        Self {
            config,
            generation,
            enabled: true,
            error_count: 0,
            throttle_streak: 0,
            firing: false,
            armed: 0,
            next_fire_at: None,
            last_error: None,
            timer: None,
        }
    }

    /// Abort the pending timer, if any. An in-flight fetch is left alone.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.next_fire_at = None;
    }

    /// Waiting on a timer rather than fetching or paused.
    pub fn is_idle(&self) -> bool {
        self.enabled && !self.firing && self.timer.is_some()
    }

    pub fn status(&self, key: &str, has_data: bool) -> KeyStatus {
        KeyStatus {
            key: key.to_string(),
            enabled: self.enabled,
            critical: self.config.critical,
            base_interval_ms: self.config.interval.as_millis() as u64,
            error_count: self.error_count,
            firing: self.firing,
            next_fire_in_ms: self
                .next_fire_at
                .map(|at| at.saturating_duration_since(Instant::now()).as_millis() as u64),
            last_error: self.last_error.as_ref().map(ToString::to_string),
            has_data,
        }
    }
}

impl Drop for PollEntry {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// Introspection view of one key.
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatus {
    pub key: String,
    pub enabled: bool,
    pub critical: bool,
    pub base_interval_ms: u64,
    pub error_count: u32,
    pub firing: bool,
    pub next_fire_in_ms: Option<u64>,
    pub last_error: Option<String>,
    pub has_data: bool,
}
