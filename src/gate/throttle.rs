//! Min-interval throttling per fingerprint.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::{self, Instant};

use crate::cache::Fingerprint;

/// Spaces out calls with the same fingerprint by at least a floor.
///
/// Each call reserves the slot `max(now, previous_slot + floor)` and sleeps
/// until it, so bursts are queued instead of dropped.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    slots: Arc<DashMap<Fingerprint, Instant>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until this call may be issued. Returns how long it waited.
    pub async fn wait(&self, fingerprint: &Fingerprint, floor: Duration) -> Duration {
        let now = Instant::now();
        let slot = match self.slots.entry(fingerprint.clone()) {
            Entry::Occupied(mut e) => {
                let slot = (*e.get() + floor).max(now);
                e.insert(slot);
                slot
            }
            Entry::Vacant(v) => {
                v.insert(now);
                now
            }
        };

        let delay = slot.saturating_duration_since(now);
        if !delay.is_zero() {
            tracing::debug!(fingerprint = %fingerprint, delay_ms = delay.as_millis() as u64, "Throttling request");
            time::sleep_until(slot).await;
        }
        delay
    }

    /// Forget slots older than `horizon`; they no longer constrain anything.
    pub fn prune(&self, horizon: Duration) {
        let now = Instant::now();
        self.slots
            .retain(|_, slot| now.saturating_duration_since(*slot) < horizon);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let throttle = Throttle::new();
        let fp = Fingerprint::from("GET backend:/accounts");
        assert_eq!(throttle.wait(&fp, Duration::from_millis(100)).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_calls_are_delayed_not_rejected() {
        let throttle = Throttle::new();
        let fp = Fingerprint::from("GET backend:/accounts");
        let floor = Duration::from_millis(200);

        let start = Instant::now();
        throttle.wait(&fp, floor).await;
        throttle.wait(&fp, floor).await;
        throttle.wait(&fp, floor).await;
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_calls_pass_and_prune() {
        let throttle = Throttle::new();
        let a = Fingerprint::from("a");
        let b = Fingerprint::from("b");
        throttle.wait(&a, Duration::from_millis(100)).await;
        time::advance(Duration::from_millis(150)).await;
        assert_eq!(throttle.wait(&a, Duration::from_millis(100)).await, Duration::ZERO);

        // other fingerprints are independent
        assert_eq!(throttle.wait(&b, Duration::from_millis(100)).await, Duration::ZERO);

        time::advance(Duration::from_secs(5)).await;
        throttle.prune(Duration::from_secs(1));
        assert!(throttle.is_empty());
    }
}
