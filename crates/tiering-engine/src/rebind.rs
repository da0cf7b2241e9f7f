// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Two-phase rebind.
//!
//! Classification has already written a hot flag into every arena. The
//! executor then moves memory in two passes over the table:
//!
//! 1. **Demote** every arena that is not hot and not already on the lower
//!    tier (including arenas never placed).
//! 2. **Promote** every arena that is hot and not already on the upper tier.
//!
//! All space is freed before any is claimed, so as long as the hot set
//! fits the upper tier, the upper tier is never over capacity, even between
//! two moves. A failed move is logged and counted and the batch goes on;
//! an arena's tier only changes when its move succeeds.

use crate::{DeviceLayer, TierDevices};
use arena_registry::{ArenaProfile, ArenaTable, Tier};

/// Counts from one rebind batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RebindOutcome {
    pub demoted: u64,
    pub promoted: u64,
    /// Moves the device layer refused by policy.
    pub rejected: u64,
    /// Moves that failed for any other reason.
    pub failed: u64,
}

impl RebindOutcome {
    pub fn moves(&self) -> u64 {
        self.demoted + self.promoted
    }

    pub fn errors(&self) -> u64 {
        self.rejected + self.failed
    }

    pub fn merge(&mut self, other: &RebindOutcome) {
        self.demoted += other.demoted;
        self.promoted += other.promoted;
        self.rejected += other.rejected;
        self.failed += other.failed;
    }
}

fn move_arena(
    arena: &mut ArenaProfile,
    target: Tier,
    layer: &dyn DeviceLayer,
    tiers: &TierDevices,
    outcome: &mut RebindOutcome,
) {
    let devices = match target {
        Tier::Upper => &tiers.upper,
        _ => &tiers.lower,
    };
    match layer.set_arena_devices(arena.index(), devices) {
        Ok(()) => {
            tracing::debug!(
                "arena {} rebound {} -> {target}",
                arena.index(),
                arena.classification.tier
            );
            arena.classification.tier = target;
            match target {
                Tier::Upper => outcome.promoted += 1,
                _ => outcome.demoted += 1,
            }
        }
        Err(e) => {
            if e.is_rejection() {
                outcome.rejected += 1;
            } else {
                outcome.failed += 1;
            }
            tracing::warn!("{e}");
        }
    }
}

/// Applies every arena's hot flag to its placement.
pub fn rebind(table: &mut ArenaTable, layer: &dyn DeviceLayer, tiers: &TierDevices) -> RebindOutcome {
    let mut outcome = RebindOutcome::default();

    for arena in table.iter_mut() {
        let c = arena.classification;
        if !c.hot && c.tier != Tier::Lower {
            move_arena(arena, Tier::Lower, layer, tiers, &mut outcome);
        }
    }

    for arena in table.iter_mut() {
        let c = arena.classification;
        if c.hot && c.tier != Tier::Upper {
            move_arena(arena, Tier::Upper, layer, tiers, &mut outcome);
        }
    }

    outcome
}

/// Rebinds every arena to the lower tier regardless of its hot flag or
/// recorded tier.
///
/// Arenas already recorded as lower are moved too, so placements left
/// behind by earlier failed moves are cleared. Hot flags are reset so the
/// next classification starts from cold.
pub fn full_cold(table: &mut ArenaTable, layer: &dyn DeviceLayer, tiers: &TierDevices) -> RebindOutcome {
    let mut outcome = RebindOutcome::default();
    for arena in table.iter_mut() {
        arena.classification.mark(false);
        move_arena(arena, Tier::Lower, layer, tiers, &mut outcome);
    }
    outcome
}
