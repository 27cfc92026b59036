//! Client resilience and adaptive polling for the WealthWise services.
//!
//! A fetch flows `PollingScheduler → RequestGate → Cache / in-flight map →
//! GuardedTransport → CircuitBreaker → HttpTransport`; every layer may
//! short-circuit it.

pub mod admin;
pub mod cache;
pub mod config;
pub mod gate;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod scheduler;
pub mod transport;

pub use config::schema::SyncConfig;
pub use gate::RequestGate;
pub use lifecycle::Shutdown;
pub use scheduler::PollingScheduler;
