//! Adaptive purger pacing (`spec.md` §4.9): "Batch sizes and sleep intervals
//! adapt: if the remaining purgeable count grows between rounds, the batch
//! size increases by the initial step; if zero purgeable, the interval
//! doubles up to a cap."

use std::time::Duration;

/// Tracks the purger's current batch size and inter-round sleep interval,
/// and adapts both after each round based on how many more client groups
/// (or CVR rows) remained eligible for purge.
///
/// `spec.md` §9 "Open question: `initialBatchSize = 0`": a zero initial
/// batch size disables the purger outright — [`PurgePacing::disabled`]
/// reports that so the caller can idle (log and sleep the max interval)
/// rather than exit the purge loop, preserving the documented "current
/// behavior" rather than optimizing it away.
#[derive(Debug, Clone)]
pub struct PurgePacing {
    initial_batch_size: u64,
    batch_step: u64,
    batch_size: u64,
    initial_interval: Duration,
    interval: Duration,
    max_interval: Duration,
    last_remaining: Option<u64>,
}

impl PurgePacing {
    pub fn new(initial_batch_size: u64, initial_interval: Duration, max_interval: Duration) -> Self {
        PurgePacing {
            initial_batch_size,
            batch_step: initial_batch_size,
            batch_size: initial_batch_size,
            initial_interval,
            interval: initial_interval,
            max_interval,
            last_remaining: None,
        }
    }

    pub fn disabled(&self) -> bool {
        self.initial_batch_size == 0
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Adapts pacing for the next round given how many groups/rows remained
    /// purge-eligible after this one. A no-op while [`PurgePacing::disabled`]
    /// (`spec.md` §9's open question: idle, don't exit).
    pub fn adapt(&mut self, remaining_purgeable: u64) {
        if self.disabled() {
            return;
        }
        if remaining_purgeable == 0 {
            self.interval = (self.interval * 2).min(self.max_interval);
        } else {
            self.interval = self.initial_interval;
            if let Some(prev) = self.last_remaining {
                if remaining_purgeable > prev {
                    self.batch_size += self.batch_step;
                }
            }
        }
        self.last_remaining = Some(remaining_purgeable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_doubles_up_to_the_cap_when_nothing_is_purgeable() {
        let mut pacing = PurgePacing::new(10, Duration::from_secs(1), Duration::from_secs(8));
        pacing.adapt(0);
        assert_eq!(pacing.interval(), Duration::from_secs(2));
        pacing.adapt(0);
        assert_eq!(pacing.interval(), Duration::from_secs(4));
        pacing.adapt(0);
        assert_eq!(pacing.interval(), Duration::from_secs(8));
        pacing.adapt(0);
        assert_eq!(pacing.interval(), Duration::from_secs(8));
    }

    #[test]
    fn batch_size_grows_by_the_initial_step_when_backlog_grows() {
        let mut pacing = PurgePacing::new(10, Duration::from_secs(1), Duration::from_secs(60));
        pacing.adapt(5);
        assert_eq!(pacing.batch_size(), 10);
        pacing.adapt(20);
        assert_eq!(pacing.batch_size(), 20);
        pacing.adapt(20);
        assert_eq!(pacing.batch_size(), 20);
    }

    #[test]
    fn interval_resets_once_work_reappears() {
        let mut pacing = PurgePacing::new(10, Duration::from_secs(1), Duration::from_secs(60));
        pacing.adapt(0);
        pacing.adapt(0);
        assert_eq!(pacing.interval(), Duration::from_secs(4));
        pacing.adapt(5);
        assert_eq!(pacing.interval(), Duration::from_secs(1));
    }

    #[test]
    fn zero_initial_batch_size_disables_adaptation() {
        let mut pacing = PurgePacing::new(0, Duration::from_secs(1), Duration::from_secs(60));
        assert!(pacing.disabled());
        pacing.adapt(100);
        assert_eq!(pacing.interval(), Duration::from_secs(1));
        assert_eq!(pacing.batch_size(), 0);
    }
}
