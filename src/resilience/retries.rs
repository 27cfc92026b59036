//! Failure policy for polled keys.
//!
//! # Responsibilities
//! - Map a fetch error to what the scheduler does next
//!
//! # Design Decisions
//! - Transient and client errors consume the retry budget
//! - Auth errors pause at once; retrying a stale credential is pointless
//! - Rate-limit and circuit-open rejections follow the hint and charge the budget at a reduced rate

use std::time::Duration;

use crate::transport::{ErrorKind, FetchError};

/// What the scheduler does after a failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Count toward `retry_attempts` and back off.
    Backoff,
    /// Clear cached data and pause the key.
    Pause,
    /// Wait for the hint (or throttled backoff); charged at a reduced rate.
    Hint(Option<Duration>),
}

pub fn classify(error: &FetchError) -> FailureAction {
    match error.kind() {
        ErrorKind::Auth => FailureAction::Pause,
        ErrorKind::RateLimited | ErrorKind::CircuitOpen => FailureAction::Hint(error.retry_after()),
        ErrorKind::Transient | ErrorKind::Client => FailureAction::Backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify(&FetchError::Unauthorized(401)), FailureAction::Pause);
        assert_eq!(classify(&FetchError::Status(500)), FailureAction::Backoff);
        assert_eq!(classify(&FetchError::Status(404)), FailureAction::Backoff);
        assert_eq!(
            classify(&FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }),
            FailureAction::Hint(Some(Duration::from_secs(2)))
        );
        assert_eq!(
            classify(&FetchError::CircuitOpen {
                dependency: "ai".into(),
                retry_after: None
            }),
            FailureAction::Hint(None)
        );
    }
}
