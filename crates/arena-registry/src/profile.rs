// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-arena profiling history and tier classification.

use crate::Series;
use std::fmt;

/// Identifier of an allocation call site.
pub type SiteId = u32;

/// Memory tier an arena is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Not yet placed by the tiering engine.
    #[default]
    Unset,
    /// Slow, large capacity memory.
    Lower,
    /// Fast, small capacity memory.
    Upper,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Unset => "unset",
            Tier::Lower => "lower",
            Tier::Upper => "upper",
        };
        f.write_str(s)
    }
}

/// Hot/cold state and placement of one arena.
///
/// `hot` is the engine's decision for the current interval. `tier` is where
/// the arena actually lives and only changes when a move succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TierClassification {
    pub tier: Tier,
    pub hot: bool,
    /// Consecutive intervals this arena has been classified hot.
    pub hot_intervals: u64,
}

impl TierClassification {
    /// Records this interval's hot/cold decision.
    pub fn mark(&mut self, hot: bool) {
        self.hot = hot;
        if hot {
            self.hot_intervals += 1;
        } else {
            self.hot_intervals = 0;
        }
    }
}

/// Resident-set history: bytes present in RAM and bytes mapped but not present.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResidentRecord {
    pub resident: Series,
    pub non_resident: Series,
}

/// The historical record for one arena.
///
/// Each enabled profiler owns one sub-record, created by that profiler's
/// `on_arena_created` hook. Disabled profilers leave their sub-record `None`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArenaProfile {
    index: usize,
    sites: Vec<SiteId>,
    /// Global interval index at which this arena started recording.
    first_interval: u64,
    /// Sampled accesses, one series per hardware event.
    pub events: Option<Vec<Series>>,
    pub resident: Option<ResidentRecord>,
    pub alloc_size: Option<Series>,
    pub extent_size: Option<Series>,
    pub classification: TierClassification,
}

impl ArenaProfile {
    pub(crate) fn new(index: usize, site: SiteId, first_interval: u64, max_sites: usize) -> Self {
        let mut sites = Vec::with_capacity(max_sites.min(16));
        sites.push(site);
        Self {
            index,
            sites,
            first_interval,
            events: None,
            resident: None,
            alloc_size: None,
            extent_size: None,
            classification: TierClassification::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sites(&self) -> &[SiteId] {
        &self.sites
    }

    pub(crate) fn push_site(&mut self, site: SiteId) {
        self.sites.push(site);
    }

    pub fn first_interval(&self) -> u64 {
        self.first_interval
    }

    /// Series for hardware event `event`, if hardware sampling is enabled.
    pub fn event(&self, event: usize) -> Option<&Series> {
        self.events.as_ref().and_then(|e| e.get(event))
    }

    /// Mutable series for hardware event `event`.
    pub fn event_mut(&mut self, event: usize) -> Option<&mut Series> {
        self.events.as_mut().and_then(|e| e.get_mut(event))
    }

    /// Lengths of every enabled series. All entries are equal when the
    /// history is consistent.
    pub fn history_lengths(&self) -> Vec<usize> {
        let mut lens = Vec::new();
        if let Some(events) = &self.events {
            lens.extend(events.iter().map(Series::len));
        }
        if let Some(r) = &self.resident {
            lens.push(r.resident.len());
            lens.push(r.non_resident.len());
        }
        if let Some(s) = &self.alloc_size {
            lens.push(s.len());
        }
        if let Some(s) = &self.extent_size {
            lens.push(s.len());
        }
        lens
    }

    /// Returns `true` if every enabled series has exactly one value per
    /// interval since this arena's first interval.
    pub fn history_consistent(&self, intervals_completed: u64) -> bool {
        let expected = intervals_completed.saturating_sub(self.first_interval) as usize;
        self.history_lengths().iter().all(|&len| len == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_counts_consecutive_hot() {
        let mut c = TierClassification::default();
        c.mark(true);
        c.mark(true);
        assert_eq!(c.hot_intervals, 2);
        c.mark(false);
        assert_eq!(c.hot_intervals, 0);
        assert!(!c.hot);
    }

    #[test]
    fn test_history_consistent() {
        let mut p = ArenaProfile::new(0, 7, 2, 4);
        p.alloc_size = Some(Series::new());
        p.events = Some(vec![Series::new(), Series::new()]);
        assert!(p.history_consistent(2));

        for s in p.events.as_mut().unwrap() {
            s.commit();
        }
        assert!(!p.history_consistent(3)); // alloc_size lagging
        p.alloc_size.as_mut().unwrap().carry_forward();
        assert!(p.history_consistent(3));
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::Upper.to_string(), "upper");
        assert_eq!(Tier::default(), Tier::Unset);
    }
}
