//! Applying `[[polls]]` changes to a running scheduler.

use std::collections::HashMap;

use crate::config::PollSpec;
use crate::scheduler::{PollConfig, PollingScheduler};
use crate::transport::Transport;

/// What a reload changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub started: usize,
    pub rescheduled: usize,
    pub replaced: usize,
    pub stopped: usize,
    pub unchanged: usize,
}

/// Bring the scheduler from `previous` registrations to `next`.
///
/// New keys start, interval-only changes go through `update_interval`, any other
/// change re-registers, and keys no longer listed stop.
pub fn apply_polls<P: Transport>(
    scheduler: &PollingScheduler<P>,
    previous: &[PollSpec],
    next: &[PollSpec],
) -> ReloadSummary {
    let before: HashMap<&str, &PollSpec> = previous.iter().map(|s| (s.key.as_str(), s)).collect();
    let after: HashMap<&str, &PollSpec> = next.iter().map(|s| (s.key.as_str(), s)).collect();
    let mut summary = ReloadSummary::default();

    for spec in next {
        match before.get(spec.key.as_str()) {
            None => {
                scheduler.start_polling(&spec.key, PollConfig::from(spec));
                summary.started += 1;
            }
            Some(old) if *old == spec => summary.unchanged += 1,
            Some(old) if spec.differs_only_in_interval(old) => {
                scheduler.update_interval(&spec.key, spec.interval());
                summary.rescheduled += 1;
            }
            Some(_) => {
                scheduler.start_polling(&spec.key, PollConfig::from(spec));
                summary.replaced += 1;
            }
        }
    }

    for spec in previous {
        if !after.contains_key(spec.key.as_str()) && scheduler.stop_polling(&spec.key) {
            summary.stopped += 1;
        }
    }

    tracing::info!(
        started = summary.started,
        rescheduled = summary.rescheduled,
        replaced = summary.replaced,
        stopped = summary.stopped,
        "Poll registrations applied"
    );
    summary
}
