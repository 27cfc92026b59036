//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! RequestGate perform()
//!     → guarded.rs (circuit breaker for protected dependencies)
//!     → http.rs (reqwest call with deadline, bearer token, request id)
//!     → status mapping into FetchError
//! ```
//!
//! # Design Decisions
//! - The core only sees the `Transport` trait; payloads are opaque
//! - Response bodies are decoded to JSON but never interpreted
//! - Token rotation is lock-free (arc-swap) so in-flight calls are unaffected

pub mod guarded;
pub mod http;
pub mod types;

use futures_util::future::BoxFuture;

pub use guarded::GuardedTransport;
pub use http::HttpTransport;
pub use types::{Dependency, Endpoint, ErrorKind, FetchError, FetchResult, Method};

/// The single network primitive the core consumes.
pub trait Transport: Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;

    /// Perform one call for `endpoint`.
    fn perform<'a>(&'a self, endpoint: &'a Endpoint)
        -> BoxFuture<'a, FetchResult<Self::Payload>>;
}
