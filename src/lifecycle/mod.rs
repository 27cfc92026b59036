//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → sweeper, admin server and daemon loop observe the broadcast
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - The scheduler is torn down last so in-flight fetches can settle

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
