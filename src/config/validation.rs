//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, multiplier >= 1, jitter in [0, 1))
//! - Check upstream URLs parse
//! - Detect duplicate polling keys
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SyncConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::SyncConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("http.backend_url", &config.http.backend_url),
        ("http.ai_url", &config.http.ai_url),
    ] {
        if let Err(e) = url::Url::parse(value) {
            errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
        }
    }

    if config.http.request_timeout_ms == 0 {
        errors.push(ValidationError::new("http.request_timeout_ms", "must be > 0"));
    }
    if config.cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("cache.sweep_interval_secs", "must be > 0"));
    }

    let polling = &config.polling;
    if polling.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new("polling.backoff_multiplier", "must be >= 1.0"));
    }
    if !(0.0..1.0).contains(&polling.jitter_ratio) {
        errors.push(ValidationError::new("polling.jitter_ratio", "must be in [0, 1)"));
    }
    if polling.hidden_multiplier < 1.0 {
        errors.push(ValidationError::new("polling.hidden_multiplier", "must be >= 1.0"));
    }
    if polling.retry_attempts == 0 {
        errors.push(ValidationError::new("polling.retry_attempts", "must be > 0"));
    }
    if polling.throttled_per_attempt == 0 {
        errors.push(ValidationError::new("polling.throttled_per_attempt", "must be > 0"));
    }
    if polling.max_backoff_ms == 0 {
        errors.push(ValidationError::new("polling.max_backoff_ms", "must be > 0"));
    }

    let breaker = &config.circuit_breaker;
    if breaker.max_failures == 0 {
        errors.push(ValidationError::new("circuit_breaker.max_failures", "must be > 0"));
    }
    if breaker.half_open_retries == 0 {
        errors.push(ValidationError::new("circuit_breaker.half_open_retries", "must be > 0"));
    }

    let mut seen = HashSet::new();
    for (i, poll) in config.polls.iter().enumerate() {
        if poll.key.is_empty() {
            errors.push(ValidationError::new(format!("polls[{}].key", i), "must not be empty"));
        } else if !seen.insert(poll.key.as_str()) {
            errors.push(ValidationError::new(
                format!("polls[{}].key", i),
                format!("duplicate key '{}'", poll.key),
            ));
        }
        if poll.interval_ms == 0 {
            errors.push(ValidationError::new(format!("polls[{}].interval_ms", i), "must be > 0"));
        }
        if !poll.path.starts_with('/') {
            errors.push(ValidationError::new(format!("polls[{}].path", i), "must start with '/'"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
