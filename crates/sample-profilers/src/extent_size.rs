// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Extent-size profiler: total mapped span of each arena per interval.

use crate::{Profiler, ProfilerError, ProfilerKind, SampleContext};
use arena_registry::{ArenaProfile, Series};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExtentSizeConfig {
    pub skip_intervals: u32,
}

impl Default for ExtentSizeConfig {
    fn default() -> Self {
        Self { skip_intervals: 1 }
    }
}

pub struct ExtentSizeProfiler {
    config: ExtentSizeConfig,
}

impl ExtentSizeProfiler {
    pub fn new(config: ExtentSizeConfig) -> Self {
        Self { config }
    }
}

impl Profiler for ExtentSizeProfiler {
    fn kind(&self) -> ProfilerKind {
        ProfilerKind::ExtentSize
    }

    fn skip_ratio(&self) -> u32 {
        self.config.skip_intervals
    }

    fn init(&mut self) -> Result<(), ProfilerError> {
        Ok(())
    }

    fn deinit(&mut self) {}

    fn run(&mut self, ctx: &mut SampleContext<'_>) -> Result<(), ProfilerError> {
        let extents = ctx.extents.read()?;
        for extent in extents.iter() {
            if let Some(series) = ctx
                .table
                .get_mut(extent.arena)
                .and_then(|p| p.extent_size.as_mut())
            {
                series.accumulate(extent.len() as u64);
            }
        }
        Ok(())
    }

    fn on_interval(&self, arena: &mut ArenaProfile) {
        if let Some(s) = arena.extent_size.as_mut() {
            s.commit();
        }
    }

    fn on_skip_interval(&self, arena: &mut ArenaProfile) {
        if let Some(s) = arena.extent_size.as_mut() {
            s.carry_forward();
        }
    }

    fn on_arena_created(&self, arena: &mut ArenaProfile) {
        arena.extent_size = Some(Series::new());
    }
}
