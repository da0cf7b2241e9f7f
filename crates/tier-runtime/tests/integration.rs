// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end profiling and tiering.
//!
//! These tests drive the scheduler with replayed hardware samples and a
//! simulated device layer, proving that the registry, the profilers, the
//! tiering engine and the session compose correctly.

use arena_registry::{ArenaRegistry, RegistryLimits, Tier};
use sample_profilers::{
    AllocSizeConfig, AllocSizeProfiler, EventSpec, HardwareConfig, HardwareProfiler, InMemoryRing,
    Profiler, RingBuffer, RingMemory, RingWriter,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tier_runtime::{IntervalScheduler, ProfilingOptions, ProfilingSession, TickOutcome};
use tiering_engine::{DeviceLayer, OnlineTiering, SimulatedDevices, TieringConfig};

// ── Helpers ────────────────────────────────────────────────────

const PAGE: usize = 4096;
const PERIOD: Duration = Duration::from_millis(50);
const BASE: usize = 0x7000_0000;
const SPAN: usize = 0x10_0000;

struct Harness {
    registry: Arc<ArenaRegistry>,
    devices: Arc<SimulatedDevices>,
    scheduler: IntervalScheduler,
    writer: RingWriter,
    t0: Instant,
    ticks: u32,
}

impl Harness {
    /// Hardware replay plus an alloc-size profiler skipping `alloc_skip`.
    fn new(upper_bytes: u64, tiering: Option<TieringConfig>, alloc_skip: u32) -> Self {
        let registry = Arc::new(ArenaRegistry::new(RegistryLimits::default()).unwrap());
        let devices = Arc::new(SimulatedDevices::two_tier(upper_bytes, 1 << 40));

        let mem = InMemoryRing::new(PAGE, 8);
        let writer = mem.writer(PAGE);
        let boxed: Box<dyn RingMemory> = Box::new(mem);
        let hw = HardwareConfig {
            events: vec![EventSpec::parse("r01d3").unwrap()],
            ..HardwareConfig::default()
        };
        let mut hardware =
            HardwareProfiler::replay(hw, vec![(0, RingBuffer::new(boxed, PAGE).unwrap())]).unwrap();
        hardware.init().unwrap();
        let profilers: Vec<Box<dyn Profiler>> = vec![
            Box::new(AllocSizeProfiler::new(AllocSizeConfig {
                skip_intervals: alloc_skip,
            })),
            Box::new(hardware),
        ];
        registry
            .install_layout(|a| {
                for p in &profilers {
                    p.on_arena_created(a);
                }
            })
            .unwrap();

        let options = ProfilingOptions {
            period_ns: PERIOD.as_nanos() as u64,
            ..ProfilingOptions::default()
        };
        let engine = tiering.map(|c| OnlineTiering::new(c, devices.clone()).unwrap());
        let t0 = Instant::now();
        let scheduler = IntervalScheduler::new(&options, Arc::clone(&registry), profilers, engine, t0);
        Self {
            registry,
            devices,
            scheduler,
            writer,
            t0,
            ticks: 0,
        }
    }

    fn arena(&self, size: u64) -> usize {
        let index = self.registry.create_arena(index_site(&self.registry)).unwrap();
        self.registry.resize_arena(index, size).unwrap();
        self.devices.arena_resized(index, size);
        let start = BASE + index * SPAN;
        self.registry.register_extent(index, start, start + SPAN).unwrap();
        index
    }

    fn sample(&mut self, arena: usize, count: u64) {
        for k in 0..count {
            assert!(self.writer.write_sample(1, (BASE + arena * SPAN) as u64 + k * 8));
        }
        self.writer.publish();
    }

    /// Ticks on schedule.
    fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;
        self.scheduler.on_tick(self.t0 + PERIOD * self.ticks)
    }

    fn tiers(&self) -> Vec<Tier> {
        self.registry
            .read_profiles()
            .unwrap()
            .iter()
            .map(|a| a.classification.tier)
            .collect()
    }
}

fn index_site(registry: &ArenaRegistry) -> u32 {
    registry.read_profiles().unwrap().len() as u32
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn test_densest_arena_lands_in_upper_tier() {
    let tiering = TieringConfig::default();
    let mut h = Harness::new(200, Some(tiering), 1);
    let a = h.arena(100);
    let b = h.arena(200);
    let c = h.arena(50);
    h.sample(a, 10);
    h.sample(b, 50);
    h.sample(c, 5);

    let outcome = h.tick();
    let TickOutcome::Completed { rebind: Some(rebind), .. } = outcome else {
        panic!("expected a completed interval with a rebind, got {outcome:?}");
    };
    assert_eq!(rebind.errors(), 0);
    assert_eq!(h.tiers(), vec![Tier::Lower, Tier::Upper, Tier::Lower]);
    assert_eq!(h.devices.used(0), 200);
}

#[test]
fn test_too_soon_ticks_change_nothing() {
    let mut h = Harness::new(200, Some(TieringConfig::default()), 1);
    let a = h.arena(100);
    h.sample(a, 10);
    h.tick();
    let tiers = h.tiers();
    let intervals = h.registry.read_profiles().unwrap().intervals_completed();

    h.sample(a, 1000);
    let last = h.t0 + PERIOD * h.ticks;
    assert_eq!(h.scheduler.on_tick(last + PERIOD / 20), TickOutcome::TooSoon);
    assert_eq!(h.scheduler.on_tick(last + PERIOD / 10), TickOutcome::TooSoon);

    assert_eq!(h.registry.read_profiles().unwrap().intervals_completed(), intervals);
    assert_eq!(h.tiers(), tiers);
    assert_eq!(h.scheduler.metrics().dropped_too_soon, 2);
}

#[test]
fn test_history_invariant_across_late_arenas_and_skips() {
    let mut h = Harness::new(1 << 20, None, 3);
    h.arena(10);
    h.tick();
    h.tick();
    h.arena(20);
    h.tick();
    h.arena(30);
    for _ in 0..4 {
        h.tick();
    }

    let table = h.registry.read_profiles().unwrap();
    assert_eq!(table.intervals_completed(), 7);
    for arena in table.iter() {
        assert!(
            arena.history_consistent(table.intervals_completed()),
            "arena {} lengths {:?}",
            arena.index(),
            arena.history_lengths()
        );
    }
    assert_eq!(table.get(2).unwrap().first_interval(), 3);
}

#[test]
fn test_skip_on_first_interval_publishes_zero() {
    let mut h = Harness::new(1 << 20, None, 2);
    h.arena(10);
    h.tick(); // alloc-size runs
    let late = h.arena(99);
    h.tick(); // alloc-size skipped

    let table = h.registry.read_profiles().unwrap();
    assert_eq!(table.get(0).unwrap().alloc_size.as_ref().unwrap().values(), &[10, 10]);
    assert_eq!(table.get(late).unwrap().alloc_size.as_ref().unwrap().values(), &[0]);
}

#[test]
fn test_idle_ring_records_zero() {
    let mut h = Harness::new(1 << 20, None, 1);
    let a = h.arena(10);
    h.sample(a, 7);
    h.tick();
    h.tick();

    let table = h.registry.read_profiles().unwrap();
    assert_eq!(table.get(a).unwrap().event(0).unwrap().values(), &[7, 0]);
}

#[test]
fn test_snapshots_capture_each_interval() {
    let mut h = Harness::new(1 << 20, Some(TieringConfig::default()), 1);
    let a = h.arena(64);
    h.sample(a, 3);
    h.tick();
    h.tick();

    let table = h.registry.read_profiles().unwrap();
    let snaps: Vec<_> = table.snapshots().collect();
    assert_eq!(snaps.len(), 2);
    assert_eq!(snaps[0].index, 0);
    assert_eq!(snaps[0].total_accesses(0), 3);
    assert_eq!(snaps[1].total_accesses(0), 0);
    let json = serde_json::to_string(snaps[0]).unwrap();
    assert!(json.contains("\"index\":0"));
}

#[test]
fn test_removing_unknown_extent_twice_succeeds() {
    let devices = Arc::new(SimulatedDevices::two_tier(1 << 20, 1 << 30));
    let session = ProfilingSession::new(ProfilingOptions::default(), devices).unwrap();
    session.on_extent_removed(0x1234_5000).unwrap();
    session.on_extent_removed(0x1234_5000).unwrap();
}

#[test]
fn test_session_flushes_on_stop() {
    let devices = Arc::new(SimulatedDevices::two_tier(1 << 20, 1 << 30));
    let options = ProfilingOptions {
        period_ns: 2_000_000,
        tiering: Some(TieringConfig {
            flush_on_stop: true,
            ..TieringConfig::default()
        }),
        ..ProfilingOptions::default()
    };
    let session = ProfilingSession::new(options, devices.clone()).unwrap();
    let a = session.create_arena(1).unwrap();
    session.on_arena_resized(a, 4096).unwrap();
    let running = session.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while devices.used(0) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(devices.used(0), 4096, "arena never promoted");

    let report = running.stop().unwrap();
    assert_eq!(report.flush.unwrap().demoted, 1);
    assert_eq!(devices.used(0), 0);
    assert_eq!(report.arenas[0].classification.tier, Tier::Lower);
    assert!(report.tiering.unwrap().steps >= 1);
}
