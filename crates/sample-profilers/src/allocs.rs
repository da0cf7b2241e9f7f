// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation-size profiler: each arena's live byte count per interval.

use crate::{Profiler, ProfilerError, ProfilerKind, SampleContext};
use arena_registry::{ArenaProfile, Series};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AllocSizeConfig {
    pub skip_intervals: u32,
}

impl Default for AllocSizeConfig {
    fn default() -> Self {
        Self { skip_intervals: 1 }
    }
}

pub struct AllocSizeProfiler {
    config: AllocSizeConfig,
}

impl AllocSizeProfiler {
    pub fn new(config: AllocSizeConfig) -> Self {
        Self { config }
    }
}

impl Profiler for AllocSizeProfiler {
    fn kind(&self) -> ProfilerKind {
        ProfilerKind::AllocSize
    }

    fn skip_ratio(&self) -> u32 {
        self.config.skip_intervals
    }

    fn init(&mut self) -> Result<(), ProfilerError> {
        Ok(())
    }

    fn deinit(&mut self) {}

    fn run(&mut self, ctx: &mut SampleContext<'_>) -> Result<(), ProfilerError> {
        let sizes = ctx.sizes;
        for arena in ctx.table.iter_mut() {
            let bytes = sizes.get(arena.index());
            if let Some(series) = arena.alloc_size.as_mut() {
                series.set_pending(bytes);
            }
        }
        Ok(())
    }

    fn on_interval(&self, arena: &mut ArenaProfile) {
        if let Some(s) = arena.alloc_size.as_mut() {
            s.commit();
        }
    }

    fn on_skip_interval(&self, arena: &mut ArenaProfile) {
        if let Some(s) = arena.alloc_size.as_mut() {
            s.carry_forward();
        }
    }

    fn on_arena_created(&self, arena: &mut ArenaProfile) {
        arena.alloc_size = Some(Series::new());
    }
}
