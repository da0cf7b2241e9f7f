// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Hardware-sample profiler.
//!
//! One perf event is opened per (monitored CPU, event) pair. Every run
//! drains each ring once, resolves every sampled address to an arena
//! through the extent table and bumps that arena's per-event accumulator.
//! The extent read lock is held for the whole drain, so an extent cannot
//! be unmapped and reused halfway through attribution.

use crate::perf::{self, EventSpec, PerfEventAttr};
use crate::ring::{RingBuffer, RingMemory};
use crate::{Profiler, ProfilerError, ProfilerKind, SampleContext};
use arena_registry::{ArenaProfile, Series};

/// Options for the hardware-sample profiler.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Events to sample, by name or raw `rXXXX` code.
    pub events: Vec<EventSpec>,
    /// CPUs to monitor. `-1` follows this process on every CPU.
    pub cpus: Vec<i32>,
    /// Events between two samples.
    pub sample_period: u64,
    /// The data area of each ring is `2^ring_pages_exp` pages.
    pub ring_pages_exp: u32,
    /// `precise_ip` requested from the PMU (0-3).
    pub precise_ip: u8,
    pub skip_intervals: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            events: vec![EventSpec::default()],
            cpus: vec![-1],
            sample_period: 8,
            ring_pages_exp: 6,
            precise_ip: 0,
            skip_intervals: 1,
        }
    }
}

impl HardwareConfig {
    pub fn validate(&self) -> Result<(), ProfilerError> {
        if self.events.is_empty() {
            return Err(ProfilerError::InvalidConfig(
                "hardware profiler needs at least one event".into(),
            ));
        }
        if self.cpus.is_empty() {
            return Err(ProfilerError::InvalidConfig(
                "hardware profiler needs at least one cpu (-1 for this process)".into(),
            ));
        }
        if self.sample_period == 0 {
            return Err(ProfilerError::InvalidConfig("sample_period must be non-zero".into()));
        }
        if self.ring_pages_exp > 16 {
            return Err(ProfilerError::InvalidConfig(format!(
                "ring_pages_exp {} is too large (max 16)",
                self.ring_pages_exp
            )));
        }
        Ok(())
    }

    /// Data pages per ring.
    pub fn data_pages(&self) -> usize {
        1usize << self.ring_pages_exp
    }
}

/// Cumulative drain counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct HardwareStats {
    /// Drains that found new data.
    pub drains: u64,
    /// Drains skipped because the head had not moved.
    pub idle_drains: u64,
    /// Samples attributed to an arena.
    pub attributed: u64,
    /// Samples whose address no extent covers.
    pub unresolved: u64,
}

struct SampleStream {
    event: usize,
    cpu: i32,
    ring: RingBuffer<Box<dyn RingMemory>>,
    #[cfg(target_os = "linux")]
    file: Option<std::fs::File>,
}

enum RingSource {
    Perf,
    Replay,
}

pub struct HardwareProfiler {
    config: HardwareConfig,
    source: RingSource,
    streams: Vec<SampleStream>,
    stats: HardwareStats,
}

impl HardwareProfiler {
    /// A profiler that opens perf events at `init`.
    pub fn new(config: HardwareConfig) -> Result<Self, ProfilerError> {
        config.validate()?;
        Ok(Self {
            config,
            source: RingSource::Perf,
            streams: Vec::new(),
            stats: HardwareStats::default(),
        })
    }

    /// A profiler that drains caller-provided rings instead of perf.
    ///
    /// Each ring is paired with the index of the event it carries.
    pub fn replay(
        config: HardwareConfig,
        rings: Vec<(usize, RingBuffer<Box<dyn RingMemory>>)>,
    ) -> Result<Self, ProfilerError> {
        config.validate()?;
        let mut streams = Vec::with_capacity(rings.len());
        for (event, ring) in rings {
            if event >= config.events.len() {
                return Err(ProfilerError::InvalidConfig(format!(
                    "replay ring for event {event} but only {} events configured",
                    config.events.len()
                )));
            }
            streams.push(SampleStream {
                event,
                cpu: -1,
                ring,
                #[cfg(target_os = "linux")]
                file: None,
            });
        }
        Ok(Self {
            config,
            source: RingSource::Replay,
            streams,
            stats: HardwareStats::default(),
        })
    }

    pub fn events(&self) -> &[EventSpec] {
        &self.config.events
    }

    pub fn stats(&self) -> HardwareStats {
        self.stats
    }

    /// Number of open rings.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    #[cfg(target_os = "linux")]
    fn open_streams(&mut self) -> Result<(), ProfilerError> {
        let page_size = perf::page_size();
        let data_pages = self.config.data_pages();
        for &cpu in &self.config.cpus {
            for (event, spec) in self.config.events.iter().enumerate() {
                let attr =
                    PerfEventAttr::sampling(spec, self.config.sample_period, self.config.precise_ip);
                let opened = perf::sys::open(&attr, spec.name(), cpu, page_size, data_pages)?;
                tracing::debug!(
                    "opened perf event '{}' on cpu {cpu} (precise_ip {}, {} data pages)",
                    spec,
                    attr.precise_ip(),
                    data_pages
                );
                let memory: Box<dyn RingMemory> = Box::new(opened.ring);
                self.streams.push(SampleStream {
                    event,
                    cpu,
                    ring: RingBuffer::new(memory, page_size)?,
                    file: Some(opened.file),
                });
            }
        }
        for stream in &self.streams {
            if let Some(file) = &stream.file {
                perf::sys::enable(file).map_err(|source| ProfilerError::PerfOpen {
                    event: self.config.events[stream.event].to_string(),
                    cpu: stream.cpu,
                    source,
                })?;
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn open_streams(&mut self) -> Result<(), ProfilerError> {
        Err(ProfilerError::NotAvailable(
            "perf_event_open is only available on Linux".into(),
        ))
    }
}

impl Profiler for HardwareProfiler {
    fn kind(&self) -> ProfilerKind {
        ProfilerKind::Hardware
    }

    fn skip_ratio(&self) -> u32 {
        self.config.skip_intervals
    }

    fn init(&mut self) -> Result<(), ProfilerError> {
        if let RingSource::Perf = self.source {
            if let Err(e) = self.open_streams() {
                self.deinit();
                return Err(e);
            }
        }
        tracing::info!(
            "hardware profiler sampling {} event(s) over {} ring(s)",
            self.config.events.len(),
            self.streams.len()
        );
        Ok(())
    }

    fn deinit(&mut self) {
        #[cfg(target_os = "linux")]
        for stream in &self.streams {
            if let Some(file) = &stream.file {
                if let Err(e) = perf::sys::disable(file) {
                    tracing::warn!("failed to disable perf event on cpu {}: {e}", stream.cpu);
                }
            }
        }
        self.streams.clear();
    }

    fn run(&mut self, ctx: &mut SampleContext<'_>) -> Result<(), ProfilerError> {
        let extents = ctx.extents.read()?;
        for stream in &mut self.streams {
            let event = stream.event;
            let table = &mut *ctx.table;
            let mut attributed = 0u64;
            let mut unresolved = 0u64;

            let drained = stream.ring.drain(|addr| {
                let series = extents
                    .resolve(addr as usize)
                    .and_then(|arena| table.get_mut(arena))
                    .and_then(|profile| profile.event_mut(event));
                match series {
                    Some(s) => {
                        s.accumulate(1);
                        attributed += 1;
                    }
                    None => unresolved += 1,
                }
            });

            if drained.advanced {
                self.stats.drains += 1;
            } else {
                self.stats.idle_drains += 1;
            }
            self.stats.attributed += attributed;
            self.stats.unresolved += unresolved;
        }
        Ok(())
    }

    fn on_interval(&self, arena: &mut ArenaProfile) {
        if let Some(events) = arena.events.as_mut() {
            events.iter_mut().for_each(Series::commit);
        }
    }

    fn on_skip_interval(&self, arena: &mut ArenaProfile) {
        if let Some(events) = arena.events.as_mut() {
            events.iter_mut().for_each(Series::carry_forward);
        }
    }

    fn on_arena_created(&self, arena: &mut ArenaProfile) {
        arena.events = Some(vec![Series::new(); self.config.events.len()]);
    }
}
