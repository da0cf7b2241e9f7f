// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The capability set every profiler implements.
//!
//! A profiler has two halves. `run` measures once per interval and leaves
//! its results in the pending accumulators of each arena's sub-record. The
//! per-arena hooks (`on_interval`, `on_skip_interval`) then publish or carry
//! forward those accumulators while the scheduler walks the arena table.

use crate::ProfilerError;
use arena_registry::{ArenaProfile, ArenaSizes, ArenaTable, ExtentTable};
use std::fmt;

/// The four measurement sources, in the order the scheduler runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilerKind {
    Hardware,
    ResidentSet,
    ExtentSize,
    AllocSize,
}

impl ProfilerKind {
    pub const ALL: [ProfilerKind; 4] = [
        ProfilerKind::Hardware,
        ProfilerKind::ResidentSet,
        ProfilerKind::ExtentSize,
        ProfilerKind::AllocSize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProfilerKind::Hardware => "hardware",
            ProfilerKind::ResidentSet => "resident-set",
            ProfilerKind::ExtentSize => "extent-size",
            ProfilerKind::AllocSize => "alloc-size",
        }
    }
}

impl fmt::Display for ProfilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a profiler can see while it measures.
///
/// The table is borrowed from the held profile lock; the extent table and
/// size slots are borrowed from the registry alongside it.
pub struct SampleContext<'a> {
    pub table: &'a mut ArenaTable,
    pub extents: &'a ExtentTable,
    pub sizes: &'a ArenaSizes,
}

/// A periodic measurement source.
pub trait Profiler: Send {
    fn kind(&self) -> ProfilerKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Run every `skip_ratio`-th interval; skipped intervals carry forward.
    fn skip_ratio(&self) -> u32 {
        1
    }

    /// Acquires the profiler's resources (perf fds, pagemap handle).
    fn init(&mut self) -> Result<(), ProfilerError>;

    /// Releases resources. Called after the control thread has stopped.
    fn deinit(&mut self);

    /// Measures one interval into the arenas' pending accumulators.
    fn run(&mut self, ctx: &mut SampleContext<'_>) -> Result<(), ProfilerError>;

    /// Publishes this interval's value for one arena.
    fn on_interval(&self, arena: &mut ArenaProfile);

    /// Publishes the previous value again (zero for a new arena).
    fn on_skip_interval(&self, arena: &mut ArenaProfile);

    /// Creates this profiler's empty sub-record on a new arena.
    fn on_arena_created(&self, arena: &mut ArenaProfile);
}

/// Tracks when a profiler with skip ratio `N` is due.
#[derive(Debug, Clone)]
pub struct SkipCounter {
    ratio: u32,
    count: u32,
}

impl SkipCounter {
    pub fn new(ratio: u32) -> Self {
        Self {
            ratio: ratio.max(1),
            count: 0,
        }
    }

    /// Advances one interval and reports whether the profiler runs in it.
    /// The first interval always runs.
    pub fn tick(&mut self) -> bool {
        let due = self.count == 0;
        self.count += 1;
        if self.count >= self.ratio {
            self.count = 0;
        }
        due
    }

    pub fn ratio(&self) -> u32 {
        self.ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_counter_every_third() {
        let mut c = SkipCounter::new(3);
        let runs: Vec<bool> = (0..7).map(|_| c.tick()).collect();
        assert_eq!(runs, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_skip_counter_zero_means_every() {
        let mut c = SkipCounter::new(0);
        assert_eq!(c.ratio(), 1);
        assert!((0..4).all(|_| c.tick()));
    }

    #[test]
    fn test_kind_order_and_names() {
        let mut kinds = ProfilerKind::ALL;
        kinds.sort();
        assert_eq!(kinds, ProfilerKind::ALL);
        assert_eq!(ProfilerKind::ResidentSet.to_string(), "resident-set");
    }
}
