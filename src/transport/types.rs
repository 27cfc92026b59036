//! Endpoint descriptors and error definitions shared by the transport,
//! gate, breaker and scheduler.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream service a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    /// The application's own REST backend.
    Backend,
    /// The AI/ML service.
    Ai,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Backend => "backend",
            Dependency::Ai => "ai",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Immutable description of what to fetch. Opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub dependency: Dependency,
    #[serde(default)]
    pub method: Method,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Sensitive endpoints get the stricter min-interval floor.
    #[serde(default)]
    pub sensitive: bool,
}

impl Endpoint {
    /// A `GET` against the backend.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            dependency: Dependency::Backend,
            method: Method::Get,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
            sensitive: false,
        }
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependency = dependency;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, method: Method, body: serde_json::Value) -> Self {
        self.method = method;
        self.body = Some(body);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Coarse classification used by the breaker and the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential rejected (401/403).
    Auth,
    /// Server asked us to slow down (429).
    RateLimited,
    /// Blocked locally by an open circuit.
    CircuitOpen,
    /// Timeout, 5xx or connection failure.
    Transient,
    /// Any other 4xx or an undecodable body.
    Client,
}

/// Errors raised by a fetch attempt.
///
/// `Clone` because a single settled in-flight call is handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Upstream rejected the credential.
    #[error("authentication rejected with status {0}")]
    Unauthorized(u16),

    /// Upstream rate limited the call.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-success HTTP status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The call did not settle within its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The circuit for the dependency is open; no call was made.
    #[error("circuit open for {dependency}")]
    CircuitOpen {
        dependency: String,
        retry_after: Option<Duration>,
    },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Unauthorized(_) => ErrorKind::Auth,
            FetchError::RateLimited { .. } => ErrorKind::RateLimited,
            FetchError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            FetchError::Status(code) if *code >= 500 => ErrorKind::Transient,
            FetchError::Status(_) | FetchError::Decode(_) => ErrorKind::Client,
            FetchError::Timeout(_) | FetchError::Transport(_) => ErrorKind::Transient,
        }
    }

    /// Server- or breaker-provided hint for when to try again.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            FetchError::CircuitOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the failure says something about the dependency's health.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::RateLimited
        )
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
