// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Penalty-accounting classification (ski rental).
//!
//! An arena that belongs in the upper tier but is not there pays a
//! stay-penalty every interval it keeps missing:
//!
//! ```text
//! stay(a)  += accesses(a) × per_access_penalty     while desired and not upper
//! move(a)   = size(a) × move_penalty_per_byte
//! promote a  once stay(a) ≥ move(a)
//! ```
//!
//! Like renting skis until the rent paid equals the purchase price, this
//! bounds the migrations an adversarial access pattern can force to a
//! constant factor of the optimum. Arenas already in the upper tier stay
//! hot until a promotion needs their space; the lowest-ranked are
//! displaced first, and never in favour of a lower-ranked candidate.

use super::{pack, rank, ArenaMetrics, ClassificationStrategy};
use std::collections::HashMap;

/// Cost weights for the penalty strategy.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Penalty charged per sampled access that hits the lower tier.
    pub per_access_penalty: f64,
    /// Penalty charged per byte moved.
    pub move_penalty_per_byte: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            per_access_penalty: 1.0,
            move_penalty_per_byte: 1.0 / 4096.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PenaltyStrategy {
    config: PenaltyConfig,
    /// Accumulated stay-penalty per arena index.
    stay: HashMap<usize, f64>,
}

impl PenaltyStrategy {
    pub fn new(config: PenaltyConfig) -> Self {
        Self {
            config,
            stay: HashMap::new(),
        }
    }

    /// Current stay-penalty of arena `index`.
    pub fn stay_penalty(&self, index: usize) -> f64 {
        self.stay.get(&index).copied().unwrap_or(0.0)
    }

    fn move_penalty(&self, a: &ArenaMetrics) -> f64 {
        a.size as f64 * self.config.move_penalty_per_byte
    }
}

impl ClassificationStrategy for PenaltyStrategy {
    fn name(&self) -> &str {
        "penalty"
    }

    fn classify(&mut self, arenas: &[ArenaMetrics], upper_capacity: u64) -> Vec<bool> {
        let order = rank(arenas);
        let desired = pack(arenas, &order, upper_capacity);

        for (a, &want) in arenas.iter().zip(&desired) {
            if want && !a.in_upper() {
                *self.stay.entry(a.index).or_insert(0.0) +=
                    a.accesses as f64 * self.config.per_access_penalty;
            } else {
                self.stay.remove(&a.index);
            }
        }

        let mut hot: Vec<bool> = arenas.iter().map(ArenaMetrics::in_upper).collect();
        let mut used: u64 = arenas.iter().filter(|a| a.in_upper()).map(|a| a.size).sum();

        // The tier may have shrunk under us; shed the lowest-ranked first.
        for &pos in order.iter().rev() {
            if used <= upper_capacity {
                break;
            }
            if hot[pos] {
                hot[pos] = false;
                used -= arenas[pos].size;
            }
        }

        for (rank_pos, &pos) in order.iter().enumerate() {
            let a = &arenas[pos];
            if !desired[pos] || hot[pos] {
                continue;
            }
            if self.stay_penalty(a.index) < self.move_penalty(a) {
                continue;
            }

            let mut victims = Vec::new();
            let mut remaining = used;
            for &v in order[rank_pos + 1..].iter().rev() {
                if remaining + a.size <= upper_capacity {
                    break;
                }
                if hot[v] {
                    victims.push(v);
                    remaining -= arenas[v].size;
                }
            }
            if remaining + a.size > upper_capacity {
                continue;
            }

            for v in victims {
                hot[v] = false;
                tracing::debug!("arena {} displaced by arena {}", arenas[v].index, a.index);
            }
            hot[pos] = true;
            used = remaining + a.size;
            self.stay.remove(&a.index);
        }
        hot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_util::{hot_bytes, metrics};
    use arena_registry::Tier;

    const PAGE: u64 = 4096;

    fn apply(arenas: &mut [ArenaMetrics], hot: &[bool]) {
        for (a, &h) in arenas.iter_mut().zip(hot) {
            a.tier = if h { Tier::Upper } else { Tier::Lower };
            a.hot = h;
        }
    }

    #[test]
    fn test_promotes_once_stay_reaches_move_cost() {
        // Move cost 30, stay grows by 10 per interval.
        let mut s = PenaltyStrategy::default();
        let mut arenas = [metrics(0, 30 * PAGE, 10, Tier::Lower)];
        let mut history = Vec::new();
        for _ in 0..4 {
            let hot = s.classify(&arenas, 1 << 30);
            history.push(hot[0]);
            apply(&mut arenas, &hot);
        }
        assert_eq!(history, vec![false, false, true, true]);
    }

    #[test]
    fn test_stay_resets_when_no_longer_desired() {
        let mut s = PenaltyStrategy::default();
        let mut arenas = [metrics(0, 30 * PAGE, 10, Tier::Lower)];
        s.classify(&arenas, 1 << 30);
        assert_eq!(s.stay_penalty(0), 10.0);
        arenas[0].accesses = 0;
        s.classify(&arenas, 1 << 30);
        assert_eq!(s.stay_penalty(0), 0.0);
    }

    #[test]
    fn test_displaces_lower_ranked_resident() {
        let mut s = PenaltyStrategy::new(PenaltyConfig {
            per_access_penalty: 1.0,
            move_penalty_per_byte: 0.0,
        });
        let arenas = [
            metrics(0, 100, 1, Tier::Upper),
            metrics(1, 100, 90, Tier::Lower),
        ];
        assert_eq!(s.classify(&arenas, 100), vec![false, true]);
    }

    #[test]
    fn test_unpaid_candidate_waits_before_displacing() {
        let mut s = PenaltyStrategy::new(PenaltyConfig {
            per_access_penalty: 1.0,
            move_penalty_per_byte: 1.0,
        });
        let arenas = [
            metrics(0, 100, 1, Tier::Upper),
            metrics(1, 100, 90, Tier::Lower),
        ];
        // Move cost 100: stay is 90 after one interval, 180 after two.
        assert_eq!(s.classify(&arenas, 100), vec![true, false]);
        assert_eq!(s.classify(&arenas, 100), vec![false, true]);
    }

    #[test]
    fn test_resident_zero_access_arena_stays_until_needed() {
        let mut s = PenaltyStrategy::default();
        let arenas = [metrics(0, 100, 0, Tier::Upper)];
        assert_eq!(s.classify(&arenas, 1000), vec![true]);
    }

    #[test]
    fn test_hot_set_always_fits() {
        let mut s = PenaltyStrategy::new(PenaltyConfig {
            per_access_penalty: 1.0,
            move_penalty_per_byte: 0.01,
        });
        let mut arenas: Vec<_> = (0..12)
            .map(|i| metrics(i, 64 * (i as u64 % 5 + 1), 0, Tier::Lower))
            .collect();
        for round in 0..30u64 {
            for (i, a) in arenas.iter_mut().enumerate() {
                a.accesses = (round * 7 + i as u64 * 13) % 50;
            }
            let cap = if round < 15 { 700 } else { 300 };
            let hot = s.classify(&arenas, cap);
            assert!(hot_bytes(&arenas, &hot) <= cap, "round {round}");
            apply(&mut arenas, &hot);
        }
    }
}
