// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scheduler health counters.
//!
//! [`SchedulerMetrics`] answers the questions that matter when tuning the
//! period: how many ticks were dropped as too soon, how many intervals were
//! abandoned, and how long an interval takes compared to the period.

use std::time::Duration;
use tiering_engine::RebindOutcome;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerMetrics {
    pub intervals_completed: u64,
    /// Ticks that arrived before `too_soon_ratio` of the period had passed.
    pub dropped_too_soon: u64,
    /// Intervals given up because the profile lock could not be taken.
    pub abandoned: u64,
    /// Profiler runs that returned an error; their values were carried forward.
    pub profiler_errors: u64,
    pub total_interval_time: Duration,
    pub max_interval_time: Duration,
    pub rebinds: RebindOutcome,
}

impl SchedulerMetrics {
    /// Records one completed interval.
    pub fn record_interval(&mut self, duration: Duration, rebind: Option<&RebindOutcome>) {
        self.intervals_completed += 1;
        self.total_interval_time += duration;
        if duration > self.max_interval_time {
            self.max_interval_time = duration;
        }
        if let Some(outcome) = rebind {
            self.rebinds.merge(outcome);
        }
    }

    /// Mean time spent inside an interval.
    pub fn mean_interval_time(&self) -> Duration {
        if self.intervals_completed == 0 {
            return Duration::ZERO;
        }
        self.total_interval_time / self.intervals_completed as u32
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} intervals (mean {:.2?}, max {:.2?}), {} dropped too soon, {} abandoned, \
             {} promotions, {} demotions, {} failed moves",
            self.intervals_completed,
            self.mean_interval_time(),
            self.max_interval_time,
            self.dropped_too_soon,
            self.abandoned,
            self.rebinds.promoted,
            self.rebinds.demoted,
            self.rebinds.errors(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_mean() {
        let mut m = SchedulerMetrics::default();
        assert_eq!(m.mean_interval_time(), Duration::ZERO);
        m.record_interval(Duration::from_millis(2), None);
        m.record_interval(
            Duration::from_millis(6),
            Some(&RebindOutcome {
                promoted: 2,
                demoted: 1,
                ..Default::default()
            }),
        );
        assert_eq!(m.intervals_completed, 2);
        assert_eq!(m.mean_interval_time(), Duration::from_millis(4));
        assert_eq!(m.max_interval_time, Duration::from_millis(6));
        assert_eq!(m.rebinds.moves(), 3);
    }

    #[test]
    fn test_summary() {
        let m = SchedulerMetrics {
            intervals_completed: 3,
            dropped_too_soon: 2,
            ..Default::default()
        };
        let s = m.summary();
        assert!(s.starts_with("3 intervals"));
        assert!(s.contains("2 dropped too soon"));
    }
}
