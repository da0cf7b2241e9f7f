// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Threshold classification.
//!
//! Ranks arenas by recent accesses per byte and packs the best ones into
//! the upper tier until it is full:
//!
//! ```text
//! density(a) = accesses(a) / size(a)
//! hot        = greedy_pack(sort_desc(density), upper_capacity)
//! ```
//!
//! # Rebind Threshold
//! Once the upper tier is full, replacing its contents costs real copies.
//! The candidate set is only adopted if it captures at least
//! `rebind_threshold × total_accesses` more accesses than the arenas
//! already resident in the upper tier. A threshold of `0.0` always adopts
//! a candidate that is no worse.

use super::{pack, rank, ArenaMetrics, ClassificationStrategy};

#[derive(Debug, Clone)]
pub struct ThresholdStrategy {
    rebind_threshold: f64,
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl ThresholdStrategy {
    /// `rebind_threshold` is clamped to `[0.0, 1.0]`.
    pub fn new(rebind_threshold: f64) -> Self {
        Self {
            rebind_threshold: rebind_threshold.clamp(0.0, 1.0),
        }
    }
}

impl ClassificationStrategy for ThresholdStrategy {
    fn name(&self) -> &str {
        "threshold"
    }

    fn classify(&mut self, arenas: &[ArenaMetrics], upper_capacity: u64) -> Vec<bool> {
        let order = rank(arenas);
        let candidate = pack(arenas, &order, upper_capacity);

        let resident_bytes: u64 = arenas.iter().filter(|a| a.in_upper()).map(|a| a.size).sum();
        let free = upper_capacity.saturating_sub(resident_bytes);
        let needs_displacement = arenas
            .iter()
            .zip(&candidate)
            .any(|(a, &hot)| hot && !a.in_upper() && a.size > free);
        if !needs_displacement || resident_bytes > upper_capacity {
            return candidate;
        }

        let total: u64 = arenas.iter().map(|a| a.accesses).sum();
        let current_value: u64 = arenas.iter().filter(|a| a.in_upper()).map(|a| a.accesses).sum();
        let candidate_value: u64 = arenas
            .iter()
            .zip(&candidate)
            .filter(|(_, &hot)| hot)
            .map(|(a, _)| a.accesses)
            .sum();
        let gain = candidate_value.saturating_sub(current_value) as f64;
        if candidate_value < current_value || gain < self.rebind_threshold * total as f64 {
            tracing::debug!(
                "keeping upper tier: candidate gains {gain} of {total} accesses (threshold {:.2})",
                self.rebind_threshold
            );
            return arenas.iter().map(ArenaMetrics::in_upper).collect();
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_util::{hot_bytes, metrics};
    use arena_registry::Tier;

    #[test]
    fn test_one_arena_capacity_picks_densest() {
        let arenas = [
            metrics(0, 100, 10, Tier::Unset),
            metrics(1, 200, 50, Tier::Unset),
            metrics(2, 50, 5, Tier::Unset),
        ];
        let hot = ThresholdStrategy::default().classify(&arenas, 200);
        assert_eq!(hot, vec![false, true, false]);
    }

    #[test]
    fn test_zero_access_never_hot() {
        let arenas = [metrics(0, 10, 0, Tier::Unset), metrics(1, 10, 0, Tier::Upper)];
        let hot = ThresholdStrategy::default().classify(&arenas, 1 << 20);
        assert_eq!(hot, vec![false, false]);
    }

    #[test]
    fn test_hot_set_fits_capacity() {
        let arenas: Vec<_> = (0..20)
            .map(|i| metrics(i, 37 * (i as u64 + 1), 1000 - i as u64 * 13, Tier::Lower))
            .collect();
        for cap in [0, 50, 400, 2000, 100_000] {
            let hot = ThresholdStrategy::default().classify(&arenas, cap);
            assert!(hot_bytes(&arenas, &hot) <= cap);
        }
    }

    #[test]
    fn test_rebind_threshold_keeps_current_set() {
        // Upper holds arena 0; arena 1 is slightly better but needs its space.
        let arenas = [metrics(0, 100, 100, Tier::Upper), metrics(1, 100, 105, Tier::Lower)];
        let mut sticky = ThresholdStrategy::new(0.10);
        assert_eq!(sticky.classify(&arenas, 100), vec![true, false]);

        let mut eager = ThresholdStrategy::new(0.0);
        assert_eq!(eager.classify(&arenas, 100), vec![false, true]);
    }

    #[test]
    fn test_rebind_threshold_ignored_when_room_left() {
        let arenas = [metrics(0, 100, 100, Tier::Upper), metrics(1, 100, 105, Tier::Lower)];
        let mut sticky = ThresholdStrategy::new(0.5);
        assert_eq!(sticky.classify(&arenas, 200), vec![true, true]);
    }
}
