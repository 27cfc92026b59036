//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → circuit_breaker.rs (fail fast while the dependency is down)
//!     → timeouts.rs (enforce the per-call deadline)
//!     → On failure: retries.rs (decide backoff, pause or hint)
//!     → backoff.rs (compute the next fire delay)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Breakers and the gate annotate and forward errors, never swallow them
//! - Only the scheduler turns a run of failures into a paused key

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::DelayPolicy;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakers, CircuitState};
