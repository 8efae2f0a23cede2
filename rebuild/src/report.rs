//! Periodic progress reporting.

use std::time::Duration;

use metrics::gauge;
use tokio::time::Instant;
use tracing::info;

use crate::commands::{CommandPools, CommandRunner};
use crate::metrics::{
    REBUILD_PENDING_FOREIGN_KEYS, REBUILD_POOL_ACTIVE_COMMANDS, REBUILD_POOL_WAITING_COMMANDS,
    STEP_LABEL,
};
use crate::state::DependencyResolver;

/// Logs pool occupancy and pending foreign keys at most once per interval.
#[derive(Debug)]
pub struct Reporter {
    interval: Duration,
    last_report: Instant,
    reports: u64,
}

impl Reporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: Instant::now(),
            reports: 0,
        }
    }

    /// Reports if the interval elapsed since the previous report. Returns whether it reported.
    pub fn maybe_report<R>(&mut self, pools: &CommandPools<R>, resolver: &DependencyResolver) -> bool
    where
        R: CommandRunner,
    {
        if self.last_report.elapsed() < self.interval {
            return false;
        }

        self.report(pools, resolver);

        true
    }

    /// Logs and records the current occupancy of every pool.
    pub fn report<R>(&mut self, pools: &CommandPools<R>, resolver: &DependencyResolver)
    where
        R: CommandRunner,
    {
        self.last_report = Instant::now();
        self.reports += 1;

        for pool in pools.iter() {
            let step = pool.step();
            let active = pool.active_count();
            let waiting = pool.waiting_count();

            gauge!(REBUILD_POOL_ACTIVE_COMMANDS, STEP_LABEL => step.as_str()).set(active as f64);
            gauge!(REBUILD_POOL_WAITING_COMMANDS, STEP_LABEL => step.as_str()).set(waiting as f64);

            if active > 0 || waiting > 0 {
                info!(
                    %step,
                    active,
                    waiting,
                    peak = pool.peak_active_count(),
                    "command pool progress"
                );
            }
        }

        let pending_foreign_keys = resolver.pending_count();
        gauge!(REBUILD_PENDING_FOREIGN_KEYS).set(pending_foreign_keys as f64);
        info!(pending_foreign_keys, "foreign keys waiting on their tables");
    }

    /// Number of reports emitted so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }
}

#[cfg(test)]
mod tests {
    use rebuild_config::shared::ConcurrencyConfig;

    use super::*;
    use crate::test_utils::runner::ScriptedRunner;

    #[tokio::test(start_paused = true)]
    async fn reports_once_per_interval() {
        let pools = CommandPools::new(&ConcurrencyConfig::default(), ScriptedRunner::new());
        let resolver = DependencyResolver::new();
        let mut reporter = Reporter::new(Duration::from_secs(60));

        assert!(!reporter.maybe_report(&pools, &resolver));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(reporter.maybe_report(&pools, &resolver));
        assert!(!reporter.maybe_report(&pools, &resolver));
        assert_eq!(reporter.reports(), 1);
    }
}
