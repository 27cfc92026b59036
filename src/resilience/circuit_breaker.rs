//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= max_failures
//! Open → Half-Open: next attempt after reset_timeout has elapsed
//! Half-Open → Closed: success_count reaches half_open_retries
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency (see `CircuitBreakers`)
//! - No background timer: Open → Half-Open is evaluated by `can_attempt`
//! - Rejections carry the remaining cooldown so callers can fall back immediately

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

// Re-export the breaker settings from the config schema
pub use crate::config::schema::CircuitBreakerConfig;

use crate::observability::metrics;
use crate::transport::{FetchError, FetchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            status: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub dependency: String,
    pub status: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_age_ms: Option<u64>,
}

/// State machine gating calls to one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // State is a handful of counters; a poisoned lock still holds valid data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a call may be issued now.
    ///
    /// Performs the Open → Half-Open transition once the cooldown has elapsed.
    pub fn can_attempt(&self) -> bool {
        let mut state = self.lock();
        match state.status {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = state
                    .last_failure
                    .map(|at| at.elapsed() > self.config.reset_timeout())
                    .unwrap_or(true);
                if cooled {
                    state.status = CircuitState::HalfOpen;
                    state.success_count = 0;
                    tracing::info!(dependency = %self.name, "Circuit half-open, probing");
                    metrics::record_circuit_state(&self.name, CircuitState::HalfOpen);
                }
                cooled
            }
            CircuitState::HalfOpen => state.success_count < self.config.half_open_retries,
        }
    }

    /// Record a successful attempt.
    pub fn on_success(&self) {
        let mut state = self.lock();
        match state.status {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.half_open_retries {
                    state.status = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    tracing::info!(dependency = %self.name, "Circuit closed, dependency recovered");
                    metrics::record_circuit_state(&self.name, CircuitState::Closed);
                }
            }
            // A call issued before the circuit opened settled late.
            CircuitState::Open => {}
        }
    }

    /// Record a failed attempt.
    pub fn on_failure(&self) {
        let mut state = self.lock();
        state.last_failure = Some(Instant::now());
        match state.status {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.max_failures {
                    state.status = CircuitState::Open;
                    tracing::warn!(
                        dependency = %self.name,
                        failures = state.failure_count,
                        "Circuit opened"
                    );
                    metrics::record_circuit_state(&self.name, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                state.status = CircuitState::Open;
                state.failure_count = 0;
                state.success_count = 0;
                tracing::warn!(dependency = %self.name, "Probe failed, circuit reopened");
                metrics::record_circuit_state(&self.name, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().status
    }

    /// Remaining cooldown while open.
    pub fn retry_after(&self) -> Option<Duration> {
        let state = self.lock();
        match (state.status, state.last_failure) {
            (CircuitState::Open, Some(at)) => {
                Some(self.config.reset_timeout().saturating_sub(at.elapsed()))
            }
            _ => None,
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        CircuitSnapshot {
            dependency: self.name.clone(),
            status: state.status,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_age_ms: state.last_failure.map(|at| at.elapsed().as_millis() as u64),
        }
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        *self.lock() = BreakerState::closed();
        metrics::record_circuit_state(&self.name, CircuitState::Closed);
    }

    /// Run one attempt through the breaker.
    ///
    /// Rejected calls never invoke `f`. Client-side errors count as a success
    /// because the dependency did answer.
    pub async fn call<T, F, Fut>(&self, f: F) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        if !self.can_attempt() {
            metrics::record_circuit_rejection(&self.name);
            return Err(FetchError::CircuitOpen {
                dependency: self.name.clone(),
                retry_after: self.retry_after(),
            });
        }

        let result = f().await;
        match &result {
            Err(e) if e.is_dependency_failure() => self.on_failure(),
            _ => self.on_success(),
        }
        result
    }
}

/// One breaker per dependency name.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    pub fn get_or_create(&self, dependency: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(dependency, self.config.clone())))
            .clone()
    }

    pub fn get(&self, dependency: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(dependency).map(|r| r.value().clone())
    }

    pub fn is_protected(&self, dependency: &str) -> bool {
        self.config.protected.iter().any(|d| d == dependency)
    }

    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|r| r.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("ai", CircuitBreakerConfig::default())
    }

    fn trip(cb: &CircuitBreaker) {
        for _ in 0..5 {
            assert!(cb.can_attempt());
            cb.on_failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_after_max_failures() {
        let cb = breaker();
        for _ in 0..4 {
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_attempt());

        time::advance(Duration::from_millis(60_000)).await;
        assert!(!cb.can_attempt(), "timeout must be strictly exceeded");

        time::advance(Duration::from_millis(1)).await;
        assert!(cb.can_attempt());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count_while_closed() {
        let cb = breaker();
        for _ in 0..4 {
            cb.on_failure();
        }
        cb.on_success();
        for _ in 0..4 {
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_promotion() {
        let cb = breaker();
        trip(&cb);
        time::advance(Duration::from_secs(61)).await;
        assert!(cb.can_attempt());

        cb.on_success();
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_attempt());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_failure_reopens() {
        let cb = breaker();
        trip(&cb);
        time::advance(Duration::from_secs(61)).await;
        assert!(cb.can_attempt());

        cb.on_success();
        cb.on_success();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_attempt());

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_rejects_without_invoking() {
        let cb = breaker();
        trip(&cb);

        let mut invoked = false;
        let result: FetchResult<()> = cb
            .call(|| {
                invoked = true;
                async { Ok(()) }
            })
            .await;

        assert!(!invoked);
        match result {
            Err(FetchError::CircuitOpen { dependency, retry_after }) => {
                assert_eq!(dependency, "ai");
                assert_eq!(retry_after, Some(Duration::from_secs(60)));
            }
            other => panic!("expected circuit open, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_records_outcomes() {
        let cb = breaker();
        for _ in 0..5 {
            let _ = cb.call(|| async { Err::<(), _>(FetchError::Status(503)) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let cb = breaker();
        for _ in 0..10 {
            let _ = cb.call(|| async { Err::<(), _>(FetchError::Status(404)) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed, "4xx means the dependency answered");
    }

    #[test]
    fn test_registry_shares_breakers() {
        let registry = CircuitBreakers::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("ai");
        let b = registry.get_or_create("ai");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.is_protected("ai"));
        assert!(!registry.is_protected("backend"));
        assert!(registry.get("backend").is_none());
        assert_eq!(registry.snapshots().len(), 1);
    }
}
