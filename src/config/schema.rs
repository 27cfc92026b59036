//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sync daemon.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::{Dependency, Endpoint, Method};

/// Root configuration for the sync daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Upstream addresses and per-call deadline.
    pub http: HttpConfig,

    /// Request cache settings.
    pub cache: CacheConfig,

    /// Min-interval throttling of repeated calls.
    pub gate: GateConfig,

    /// Backoff, jitter and duty-cycle settings.
    pub polling: PollingConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Polling registrations.
    pub polls: Vec<PollSpec>,
}

/// Upstream HTTP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of the application backend.
    pub backend_url: String,

    /// Base URL of the AI/ML service.
    pub ai_url: String,

    /// Per-call deadline in milliseconds.
    pub request_timeout_ms: u64,

    /// Unwrap `{ "success": .., "data": .. }` response envelopes.
    pub unwrap_envelope: bool,

    /// Environment variable holding the bearer token.
    pub auth_token_env: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3001/api".to_string(),
            ai_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
            unwrap_envelope: true,
            auth_token_env: "WEALTHWISE_TOKEN".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Request cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Period of the expiry sweep in seconds.
    pub sweep_interval_secs: u64,

    /// TTL for polled payloads that don't set their own.
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 120,
            default_ttl_ms: 30_000,
        }
    }
}

/// Request gate throttling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum spacing between calls with the same fingerprint.
    pub min_interval_ms: u64,

    /// Minimum spacing for endpoints flagged sensitive.
    pub sensitive_min_interval_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            sensitive_min_interval_ms: 200,
        }
    }
}

/// Polling backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Growth factor per consecutive error.
    pub backoff_multiplier: f64,

    /// Ceiling for the backed-off delay in milliseconds.
    pub max_backoff_ms: u64,

    /// Consecutive failures before a key is paused.
    pub retry_attempts: u32,

    /// Jitter half-width as a fraction of the delay.
    pub jitter_ratio: f64,

    /// Delay multiplier for non-critical keys while hidden.
    pub hidden_multiplier: f64,

    /// Base delay after a 429 without a Retry-After hint.
    pub rate_limit_base_ms: u64,

    /// Consecutive rate-limited or circuit-open responses that cost one retry attempt.
    pub throttled_per_attempt: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            backoff_multiplier: 1.5,
            max_backoff_ms: 300_000,
            retry_attempts: 3,
            jitter_ratio: 0.1,
            hidden_multiplier: 2.0,
            rate_limit_base_ms: 1_000,
            throttled_per_attempt: 3,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub max_failures: u32,

    /// Cooldown before a probe is allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Consecutive probe successes needed to close again.
    pub half_open_retries: u32,

    /// Dependencies routed through a breaker.
    pub protected: Vec<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout_ms: 60_000,
            half_open_retries: 3,
            protected: vec!["ai".to_string()],
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// One polled key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollSpec {
    /// Unique polling key.
    pub key: String,

    #[serde(default = "default_dependency")]
    pub dependency: Dependency,

    #[serde(default)]
    pub method: Method,

    pub path: String,

    #[serde(default)]
    pub query: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Nominal delay between fires.
    pub interval_ms: u64,

    /// Keep full cadence while hidden.
    #[serde(default)]
    pub critical: bool,

    /// Cache TTL override.
    #[serde(default)]
    pub ttl_ms: Option<u64>,

    /// Use the stricter min-interval floor.
    #[serde(default)]
    pub sensitive: bool,
}

fn default_dependency() -> Dependency {
    Dependency::Backend
}

impl PollSpec {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            dependency: self.dependency,
            method: self.method,
            path: self.path.clone(),
            query: self.query.clone(),
            body: self.body.clone(),
            sensitive: self.sensitive,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Same registration apart from a changed interval.
    pub fn differs_only_in_interval(&self, other: &PollSpec) -> bool {
        if self.interval_ms == other.interval_ms {
            return false;
        }
        let mut aligned = other.clone();
        aligned.interval_ms = self.interval_ms;
        self == &aligned
    }
}
