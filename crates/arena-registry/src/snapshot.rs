// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Completed-interval snapshots for reporting.
//!
//! One [`IntervalSnapshot`] is appended per completed interval. The sequence
//! of snapshots is enough to rebuild every arena's full time series.

use crate::{ArenaProfile, SiteId, Tier};
use std::time::Duration;

/// Per-arena values recorded for one interval.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArenaSample {
    pub index: usize,
    pub sites: Vec<SiteId>,
    /// Live allocated bytes at the end of the interval.
    pub size_bytes: u64,
    /// Sampled accesses per hardware event; empty if hardware sampling is off.
    pub accesses: Vec<u64>,
    pub resident_bytes: Option<u64>,
    pub non_resident_bytes: Option<u64>,
    pub alloc_bytes: Option<u64>,
    pub extent_bytes: Option<u64>,
    pub tier: Tier,
    pub hot: bool,
}

impl ArenaSample {
    /// Captures the values the arena published for `interval`.
    pub fn capture(profile: &ArenaProfile, size_bytes: u64, interval: u64) -> Self {
        let first = profile.first_interval();
        let at = |s: &crate::Series| s.value_at(interval, first);
        Self {
            index: profile.index(),
            sites: profile.sites().to_vec(),
            size_bytes,
            accesses: profile
                .events
                .as_ref()
                .map(|ev| ev.iter().map(at).collect())
                .unwrap_or_default(),
            resident_bytes: profile.resident.as_ref().map(|r| at(&r.resident)),
            non_resident_bytes: profile.resident.as_ref().map(|r| at(&r.non_resident)),
            alloc_bytes: profile.alloc_size.as_ref().map(at),
            extent_bytes: profile.extent_size.as_ref().map(at),
            tier: profile.classification.tier,
            hot: profile.classification.hot,
        }
    }
}

/// The state of every arena at one interval boundary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IntervalSnapshot {
    /// Zero-based interval index.
    pub index: u64,
    /// Time spent processing the interval (profilers, fold, tiering).
    pub duration: Duration,
    pub arenas: Vec<ArenaSample>,
}

impl IntervalSnapshot {
    /// Looks up one arena's sample.
    pub fn arena(&self, index: usize) -> Option<&ArenaSample> {
        self.arenas.iter().find(|a| a.index == index)
    }

    /// Total sampled accesses across arenas for hardware event `event`.
    pub fn total_accesses(&self, event: usize) -> u64 {
        self.arenas
            .iter()
            .filter_map(|a| a.accesses.get(event))
            .sum()
    }
}
