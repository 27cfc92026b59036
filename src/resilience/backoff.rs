//! Next-delay computation for polled keys.
//!
//! ```text
//! delay = base
//! if error_count > 0: delay = min(base * multiplier^error_count, max_backoff)
//! delay += uniform(-jitter_ratio, +jitter_ratio) * delay
//! if hidden && !critical: delay *= hidden_multiplier
//! ```

use std::time::Duration;

use rand::Rng;

use crate::config::PollingConfig;

/// Backoff and duty-cycle tuning shared by every polled key.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Fraction of the delay used as the jitter half-width.
    pub jitter_ratio: f64,
    /// Cadence penalty for non-critical keys while hidden.
    pub hidden_multiplier: f64,
    /// Starting delay after a rate-limited response without a hint.
    pub rate_limit_base_ms: u64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for DelayPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            backoff_multiplier: config.backoff_multiplier,
            max_backoff_ms: config.max_backoff_ms,
            jitter_ratio: config.jitter_ratio,
            hidden_multiplier: config.hidden_multiplier,
            rate_limit_base_ms: config.rate_limit_base_ms,
        }
    }
}

impl DelayPolicy {
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// `base * multiplier^error_count`, capped at `max_backoff`.
    pub fn backoff(&self, base: Duration, error_count: u32) -> Duration {
        if error_count == 0 {
            return base;
        }
        let factor = self.backoff_multiplier.powi(error_count as i32);
        let scaled_ms = base.as_millis() as f64 * factor;
        let capped_ms = scaled_ms.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped_ms.round() as u64)
    }

    /// Perturb `delay` by `unit * jitter_ratio`, `unit` in `[-1, 1]`.
    pub fn apply_jitter(&self, delay: Duration, unit: f64) -> Duration {
        let unit = unit.clamp(-1.0, 1.0);
        let ms = delay.as_millis() as f64;
        let jittered = ms + ms * self.jitter_ratio * unit;
        Duration::from_millis(jittered.max(0.0).round() as u64)
    }

    fn duty_cycle(&self, delay: Duration, visible: bool, critical: bool) -> Duration {
        if visible || critical {
            delay
        } else {
            Duration::from_millis((delay.as_millis() as f64 * self.hidden_multiplier).round() as u64)
        }
    }

    /// Delay without jitter, for introspection and deterministic checks.
    pub fn planned_delay(
        &self,
        base: Duration,
        error_count: u32,
        visible: bool,
        critical: bool,
    ) -> Duration {
        self.duty_cycle(self.backoff(base, error_count), visible, critical)
    }

    /// Delay until the next fire of a key.
    pub fn next_delay(
        &self,
        base: Duration,
        error_count: u32,
        visible: bool,
        critical: bool,
    ) -> Duration {
        let unit = rand::thread_rng().gen_range(-1.0..=1.0);
        let jittered = self.apply_jitter(self.backoff(base, error_count), unit);
        self.duty_cycle(jittered, visible, critical)
    }

    /// Delay after a rate-limited (or circuit-open) response.
    ///
    /// A server hint wins; otherwise back off from `rate_limit_base` on the
    /// streak of consecutive throttled responses.
    pub fn hinted_delay(&self, retry_after: Option<Duration>, streak: u32) -> Duration {
        let delay = match retry_after {
            Some(hint) => hint,
            None => self.backoff(
                Duration::from_millis(self.rate_limit_base_ms),
                streak.saturating_sub(1),
            ),
        };
        delay.min(self.max_backoff())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth() {
        let policy = DelayPolicy::default();
        let base = Duration::from_millis(1000);
        let delays: Vec<u128> = (0..3)
            .map(|n| policy.backoff(base, n).as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 1500, 2250]);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = DelayPolicy::default();
        let delay = policy.backoff(Duration::from_secs(60), 10);
        assert_eq!(delay, Duration::from_millis(300_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = DelayPolicy::default();
        let base = Duration::from_millis(1000);
        assert_eq!(policy.apply_jitter(base, -1.0), Duration::from_millis(900));
        assert_eq!(policy.apply_jitter(base, 1.0), Duration::from_millis(1100));
        assert_eq!(policy.apply_jitter(base, 0.0), base);

        for _ in 0..200 {
            let delay = policy.next_delay(base, 0, true, false).as_millis();
            assert!((900..=1100).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_hidden_penalty_skips_critical() {
        let policy = DelayPolicy::default();
        let base = Duration::from_secs(30);
        assert_eq!(policy.planned_delay(base, 0, false, false), Duration::from_secs(60));
        assert_eq!(policy.planned_delay(base, 0, false, true), Duration::from_secs(30));
        assert_eq!(policy.planned_delay(base, 0, true, false), Duration::from_secs(30));
    }

    #[test]
    fn test_hinted_delay() {
        let policy = DelayPolicy::default();
        assert_eq!(
            policy.hinted_delay(Some(Duration::from_secs(7)), 1),
            Duration::from_secs(7)
        );
        assert_eq!(policy.hinted_delay(None, 1), Duration::from_millis(1000));
        assert_eq!(policy.hinted_delay(None, 2), Duration::from_millis(1500));
        assert_eq!(
            policy.hinted_delay(Some(Duration::from_secs(3600)), 1),
            Duration::from_millis(300_000)
        );
    }
}
