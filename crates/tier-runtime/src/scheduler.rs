// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The interval scheduler.
//!
//! Everything one timer tick does lives in [`IntervalScheduler::on_tick`]:
//!
//! ```text
//! tick ─► too soon? ──yes──► drop (counted)
//!            │ no
//!            ▼
//!      lock profiles ──fail──► abandon (counted)
//!            │
//!            ▼
//!      run or skip each profiler (hardware, resident-set, extent-size, alloc-size)
//!            │
//!            ▼
//!      fold every arena ─► tiering step ─► snapshot ─► unlock
//! ```
//!
//! The scheduler is plain synchronous code. The session drives it from a
//! timer on its control thread; tests drive it with hand-picked instants.

use crate::{ProfilingOptions, RuntimeError, SchedulerMetrics};
use arena_registry::{ArenaProfile, ArenaRegistry};
use sample_profilers::{Profiler, SampleContext, SkipCounter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiering_engine::{OnlineTiering, RebindOutcome};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The tick came too soon after the previous interval and was dropped.
    TooSoon,
    /// The profile lock could not be taken; nothing was recorded.
    Abandoned,
    Completed {
        interval: u64,
        duration: Duration,
        rebind: Option<RebindOutcome>,
    },
}

struct Scheduled {
    profiler: Box<dyn Profiler>,
    skip: SkipCounter,
}

/// Runs profilers, folding and tiering once per accepted tick.
pub struct IntervalScheduler {
    registry: Arc<ArenaRegistry>,
    profilers: Vec<Scheduled>,
    tiering: Option<OnlineTiering>,
    period: Duration,
    too_soon: Duration,
    last_completed: Instant,
    metrics: SchedulerMetrics,
}

impl IntervalScheduler {
    /// Builds a scheduler over initialised profilers. Profilers are sorted
    /// into their fixed run order. `started` is the reference instant for
    /// the first too-soon check.
    pub fn new(
        options: &ProfilingOptions,
        registry: Arc<ArenaRegistry>,
        mut profilers: Vec<Box<dyn Profiler>>,
        tiering: Option<OnlineTiering>,
        started: Instant,
    ) -> Self {
        profilers.sort_by_key(|p| p.kind());
        let period = options.period();
        Self {
            registry,
            profilers: profilers
                .into_iter()
                .map(|profiler| Scheduled {
                    skip: SkipCounter::new(profiler.skip_ratio()),
                    profiler,
                })
                .collect(),
            tiering,
            period,
            too_soon: period.mul_f64(options.too_soon_ratio),
            last_completed: started,
            metrics: SchedulerMetrics::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    pub fn tiering(&self) -> Option<&OnlineTiering> {
        self.tiering.as_ref()
    }

    /// Handles one timer notification that fired at `now`.
    pub fn on_tick(&mut self, now: Instant) -> TickOutcome {
        if now.saturating_duration_since(self.last_completed) < self.too_soon {
            self.metrics.dropped_too_soon += 1;
            tracing::trace!("dropping tick that arrived too soon");
            return TickOutcome::TooSoon;
        }
        let started = Instant::now();

        let registry = Arc::clone(&self.registry);
        let mut table = match registry.lock_profiles() {
            Ok(table) => table,
            Err(e) => {
                self.metrics.abandoned += 1;
                tracing::warn!("abandoning interval: {e}");
                return TickOutcome::Abandoned;
            }
        };

        let mut ran = Vec::with_capacity(self.profilers.len());
        for scheduled in &mut self.profilers {
            if !scheduled.skip.tick() {
                ran.push(false);
                continue;
            }
            let mut ctx = SampleContext {
                table: &mut *table,
                extents: registry.extents(),
                sizes: registry.sizes(),
            };
            match scheduled.profiler.run(&mut ctx) {
                Ok(()) => ran.push(true),
                Err(e) => {
                    self.metrics.profiler_errors += 1;
                    tracing::warn!("{} profiler failed this interval: {e}", scheduled.profiler.name());
                    ran.push(false);
                }
            }
        }

        for arena in table.iter_mut() {
            fold(&self.profilers, &ran, arena);
        }

        let rebind = match self.tiering.as_mut() {
            Some(tiering) => tiering.step(&mut table, registry.sizes()),
            None => None,
        };

        let duration = started.elapsed();
        let interval = table.complete_interval(registry.sizes(), duration).index;
        drop(table);

        self.metrics.record_interval(duration, rebind.as_ref());
        // A late tick carries its scheduled instant; measure from when the
        // interval actually finished.
        self.last_completed = now.max(started) + duration;
        tracing::debug!("interval {interval} completed in {duration:.2?}");
        TickOutcome::Completed {
            interval,
            duration,
            rebind,
        }
    }

    /// Demotes every arena, if tiering is enabled.
    pub fn flush(&mut self) -> Result<Option<RebindOutcome>, RuntimeError> {
        let Some(tiering) = self.tiering.as_mut() else {
            return Ok(None);
        };
        let mut table = self.registry.lock_profiles()?;
        let outcome = tiering.flush(&mut table);
        self.metrics.rebinds.merge(&outcome);
        Ok(Some(outcome))
    }

    /// Tears the scheduler down, returning its profilers for `deinit`.
    pub fn into_parts(self) -> (Vec<Box<dyn Profiler>>, Option<OnlineTiering>, SchedulerMetrics) {
        (
            self.profilers.into_iter().map(|s| s.profiler).collect(),
            self.tiering,
            self.metrics,
        )
    }
}

fn fold(profilers: &[Scheduled], ran: &[bool], arena: &mut ArenaProfile) {
    for (scheduled, &ran) in profilers.iter().zip(ran) {
        if ran {
            scheduled.profiler.on_interval(arena);
        } else {
            scheduled.profiler.on_skip_interval(arena);
        }
    }
}
