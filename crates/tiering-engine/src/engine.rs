// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The per-interval tiering step.
//!
//! [`OnlineTiering`] runs inside the interval scheduler, under the profile
//! lock, after every profiler has folded its values for the interval:
//!
//! ```text
//! history ──► ArenaMetrics ──► strategy.classify() ──► mark(hot) ──► rebind()
//! ```
//!
//! Every hot flag is written before the first move is issued.

use crate::rebind::{full_cold, rebind, RebindOutcome};
use crate::strategy::{create_strategy, ArenaMetrics, ClassificationStrategy, PenaltyConfig};
use crate::{select_tiers, DeviceLayer, TierDevices, TieringError};
use arena_registry::{ArenaProfile, ArenaSizes, ArenaTable, ByteSize};
use std::sync::Arc;

/// Options for the online tiering step.
///
/// # TOML Format
/// ```toml
/// [tiering]
/// strategy = "penalty"
/// window = 4
/// upper_nodes = [0]
/// lower_nodes = [1]
/// upper_capacity_limit = "512M"
///
/// [tiering.penalty]
/// per_access_penalty = 1.0
/// move_penalty_per_byte = 0.000244140625
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    /// `"threshold"` (alias `"orig"`) or `"penalty"` (alias `"ski"`).
    pub strategy: String,
    /// Number of most recent intervals summed into an arena's value.
    pub window: usize,
    /// Which hardware event drives classification.
    pub event_index: usize,
    /// Run the step every N intervals.
    pub skip_intervals: u32,
    pub upper_nodes: Vec<i32>,
    pub lower_nodes: Vec<i32>,
    /// Minimum share of total accesses a full-tier swap must gain.
    pub rebind_threshold: f64,
    pub penalty: PenaltyConfig,
    /// Demote every arena when the session stops.
    pub flush_on_stop: bool,
    /// Caps the upper tier below the device capacity.
    pub upper_capacity_limit: Option<ByteSize>,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            strategy: "threshold".to_string(),
            window: 1,
            event_index: 0,
            skip_intervals: 1,
            upper_nodes: vec![0],
            lower_nodes: vec![1],
            rebind_threshold: 0.0,
            penalty: PenaltyConfig::default(),
            flush_on_stop: false,
            upper_capacity_limit: None,
        }
    }
}

impl TieringConfig {
    pub fn validate(&self) -> Result<(), TieringError> {
        let invalid = |msg: String| Err(TieringError::InvalidConfig(msg));
        if self.window == 0 {
            return invalid("window must be at least 1".into());
        }
        if self.skip_intervals == 0 {
            return invalid("skip_intervals must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.rebind_threshold) {
            return invalid(format!(
                "rebind_threshold {} is outside [0, 1]",
                self.rebind_threshold
            ));
        }
        let p = &self.penalty;
        if !(p.per_access_penalty.is_finite() && p.per_access_penalty >= 0.0)
            || !(p.move_penalty_per_byte.is_finite() && p.move_penalty_per_byte >= 0.0)
        {
            return invalid("penalty weights must be finite and non-negative".into());
        }
        if self.upper_nodes.is_empty() || self.lower_nodes.is_empty() {
            return invalid("both tiers need at least one node".into());
        }
        Ok(())
    }
}

/// Running totals for the tiering step.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TieringStats {
    pub steps: u64,
    pub skipped: u64,
    pub rebinds: RebindOutcome,
    /// Bytes marked hot by the most recent step.
    pub hot_bytes: u64,
}

/// Classifies arenas and rebinds them once per (non-skipped) interval.
pub struct OnlineTiering {
    config: TieringConfig,
    layer: Arc<dyn DeviceLayer>,
    tiers: TierDevices,
    strategy: Box<dyn ClassificationStrategy>,
    intervals_seen: u64,
    stats: TieringStats,
}

impl std::fmt::Debug for OnlineTiering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnlineTiering")
            .field("strategy", &self.strategy.name())
            .field("tiers", &self.tiers)
            .field("stats", &self.stats)
            .finish()
    }
}

impl OnlineTiering {
    /// Validates `config`, selects tier devices and builds the strategy.
    pub fn new(config: TieringConfig, layer: Arc<dyn DeviceLayer>) -> Result<Self, TieringError> {
        config.validate()?;
        let tiers = select_tiers(&layer.enumerate_devices(), &config.upper_nodes, &config.lower_nodes)?;
        let strategy = create_strategy(&config.strategy, &config)?;
        tracing::info!(
            "online tiering: strategy={}, window={}, upper={}, lower={}",
            strategy.name(),
            config.window,
            tiers.upper,
            tiers.lower,
        );
        Ok(Self {
            config,
            layer,
            tiers,
            strategy,
            intervals_seen: 0,
            stats: TieringStats::default(),
        })
    }

    pub fn config(&self) -> &TieringConfig {
        &self.config
    }

    pub fn tiers(&self) -> &TierDevices {
        &self.tiers
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn stats(&self) -> TieringStats {
        self.stats
    }

    /// Upper-tier capacity available to the hot set.
    pub fn upper_capacity(&self) -> u64 {
        let device = self.tiers.upper_capacity(self.layer.as_ref());
        match self.config.upper_capacity_limit {
            Some(limit) => device.min(limit.as_bytes()),
            None => device,
        }
    }

    fn metrics(&self, profile: &ArenaProfile, sizes: &ArenaSizes) -> ArenaMetrics {
        let size = sizes.get(profile.index());
        let accesses = match profile.event(self.config.event_index) {
            Some(series) => series.recent(self.config.window).iter().sum(),
            None => size,
        };
        ArenaMetrics {
            index: profile.index(),
            size,
            accesses,
            tier: profile.classification.tier,
            hot: profile.classification.hot,
        }
    }

    /// Runs one tiering step. Returns `None` on skipped intervals.
    pub fn step(&mut self, table: &mut ArenaTable, sizes: &ArenaSizes) -> Option<RebindOutcome> {
        let seen = self.intervals_seen;
        self.intervals_seen += 1;
        if seen % u64::from(self.config.skip_intervals) != 0 {
            self.stats.skipped += 1;
            return None;
        }

        let metrics: Vec<ArenaMetrics> = table.iter().map(|p| self.metrics(p, sizes)).collect();
        let capacity = self.upper_capacity();
        let hot = self.strategy.classify(&metrics, capacity);

        let mut hot_bytes = 0;
        for ((arena, m), &h) in table.iter_mut().zip(&metrics).zip(&hot) {
            arena.classification.mark(h);
            if h {
                hot_bytes += m.size;
            }
        }

        let outcome = rebind(table, self.layer.as_ref(), &self.tiers);
        tracing::debug!(
            "tiering step: {} of {} arenas hot ({hot_bytes} / {capacity} bytes), {} moves, {} errors",
            hot.iter().filter(|&&h| h).count(),
            metrics.len(),
            outcome.moves(),
            outcome.errors(),
        );
        self.stats.steps += 1;
        self.stats.hot_bytes = hot_bytes;
        self.stats.rebinds.merge(&outcome);
        Some(outcome)
    }

    /// Demotes every arena to the lower tier.
    pub fn flush(&mut self, table: &mut ArenaTable) -> RebindOutcome {
        let outcome = full_cold(table, self.layer.as_ref(), &self.tiers);
        tracing::info!("flushed {} arenas to the lower tier", outcome.demoted);
        self.stats.hot_bytes = 0;
        self.stats.rebinds.merge(&outcome);
        outcome
    }
}
