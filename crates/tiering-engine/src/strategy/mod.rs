// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`ClassificationStrategy`] trait and strategy implementations.

pub mod penalty;
pub mod threshold;

pub use penalty::{PenaltyConfig, PenaltyStrategy};
pub use threshold::ThresholdStrategy;

use crate::TieringError;
use arena_registry::Tier;
use std::cmp::Ordering;

/// What a strategy sees of one arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaMetrics {
    pub index: usize,
    /// Live size in bytes.
    pub size: u64,
    /// Value metric summed over the recent window (sampled accesses, or
    /// bytes when no hardware data is available).
    pub accesses: u64,
    /// Where the arena lives now.
    pub tier: Tier,
    /// Last interval's decision.
    pub hot: bool,
}

impl ArenaMetrics {
    /// Accesses per byte. Zero-sized arenas count as one byte.
    pub fn density(&self) -> f64 {
        self.accesses as f64 / self.size.max(1) as f64
    }

    pub fn in_upper(&self) -> bool {
        self.tier == Tier::Upper
    }
}

/// Trait for hot/cold classification strategies.
///
/// A strategy only decides. It returns one hot flag per input arena, in
/// input order, and the hot set it returns must fit in `upper_capacity`.
/// Moving memory is the rebind executor's job.
pub trait ClassificationStrategy: Send {
    /// Human-readable name of this strategy.
    fn name(&self) -> &str;

    fn classify(&mut self, arenas: &[ArenaMetrics], upper_capacity: u64) -> Vec<bool>;
}

/// Orders arena positions by density (descending), then index.
pub(crate) fn rank(arenas: &[ArenaMetrics]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..arenas.len()).collect();
    order.sort_by(|&a, &b| {
        arenas[b]
            .density()
            .partial_cmp(&arenas[a].density())
            .unwrap_or(Ordering::Equal)
            .then(arenas[a].index.cmp(&arenas[b].index))
    });
    order
}

/// Greedily packs ranked arenas with non-zero accesses into `capacity`.
/// Arenas that do not fit are passed over in favour of smaller ones below.
pub(crate) fn pack(arenas: &[ArenaMetrics], order: &[usize], capacity: u64) -> Vec<bool> {
    let mut hot = vec![false; arenas.len()];
    let mut used = 0u64;
    for &pos in order {
        let a = &arenas[pos];
        if a.accesses == 0 {
            continue;
        }
        if used + a.size <= capacity {
            used += a.size;
            hot[pos] = true;
        }
    }
    hot
}

/// Builds a strategy from its configured name.
pub fn create_strategy(
    name: &str,
    config: &crate::TieringConfig,
) -> Result<Box<dyn ClassificationStrategy>, TieringError> {
    match name {
        "threshold" | "orig" => Ok(Box::new(ThresholdStrategy::new(config.rebind_threshold))),
        "penalty" | "ski" => Ok(Box::new(PenaltyStrategy::new(config.penalty))),
        other => Err(TieringError::UnknownStrategy(other.to_string())),
    }
}
