//! Request cache subsystem.
//!
//! # Data Flow
//! ```text
//! RequestGate
//!     → fingerprint.rs (method + endpoint + body → key)
//!     → store.rs (fresh read or overwrite)
//!
//! Background:
//!     sweeper task → store.rs sweep() every interval
//!
//! Auth layer:
//!     credential change → clear()
//! ```
//!
//! # Design Decisions
//! - Reads never evict; expired entries are only removed by the sweep
//! - Sweep period is independent of any entry's TTL
//! - Failures are never cached

pub mod fingerprint;
pub mod store;

pub use fingerprint::Fingerprint;
pub use store::{Cache, CacheEntry};
