//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gate / breaker / scheduler produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Every log line carries the polling key or fingerprint it concerns
//! - Metric updates are plain facade calls; without an installed recorder they are no-ops

pub mod logging;
pub mod metrics;
