//! Adaptive polling subsystem.
//!
//! # Data Flow
//! ```text
//! start_polling(key) → immediate fire
//!     → RequestGate (cache / in-flight / throttle) → Transport
//!     → settle:
//!         success        → reset errors, store last data, emit Data, re-arm at base
//!         transient      → errors += 1, emit Error, re-arm backed off (pause at limit)
//!         rate limited   → emit Error, re-arm after hint, budget charged at a reduced rate
//!         auth           → clear cache, emit Error, pause
//!         across a clear → discard, fire again
//! ```
//!
//! # Design Decisions
//! - One timer per key; a registration generation and an arming ticket
//!   invalidate stale timers
//! - Timers hold weak references; dropping the scheduler stops everything
//! - Hidden mode stretches only non-critical keys and only from the next delay
//! - Becoming visible fires every idle key immediately, unless it is waiting
//!   out a rate-limit or circuit hint

pub mod entry;
pub mod events;
pub mod polling;
pub mod reload;

pub use entry::{KeyStatus, PollConfig};
pub use events::{EventHub, EventKind, ListenerId, PollEvent};
pub use polling::{PollingScheduler, SchedulerSnapshot};
pub use reload::{apply_polls, ReloadSummary};
