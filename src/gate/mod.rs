//! Request gate subsystem.
//!
//! # Data Flow
//! ```text
//! execute(fingerprint, ttl, perform)
//!     → cache hit?          return cached payload, no call
//!     → in flight?          await the same shared result
//!     → otherwise           throttle.rs floor, perform(), cache on success
//! ```
//!
//! # Design Decisions
//! - At most one outstanding call per fingerprint (dashmap entry API makes
//!   check-and-insert atomic on a multi-threaded runtime)
//! - In-flight entries are removed by the call itself the moment it settles
//! - Throttling delays calls, it never rejects them
//! - Errors are forwarded unmodified and never cached
//! - `clear()` starts a new epoch: outstanding calls are forgotten and their
//!   results are never cached

pub mod request_gate;
pub mod throttle;

pub use request_gate::RequestGate;
pub use throttle::Throttle;
