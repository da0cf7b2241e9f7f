// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Compare classification strategies on a phase-changing workload.
//!
//! Eight equally sized arenas share an upper tier that holds four of them.
//! For the first half of the run arenas 0-3 take most of the accesses, then
//! the hot set flips to arenas 4-7. Samples are replayed through the real
//! hardware-profiler drain path, so the only difference between rows is
//! the strategy.
//!
//! ```bash
//! cargo run -p tier-runtime --example strategy_comparison
//! ```

use arena_registry::{ArenaRegistry, RegistryLimits, Tier};
use sample_profilers::{
    EventSpec, HardwareConfig, HardwareProfiler, InMemoryRing, Profiler, RingBuffer, RingMemory,
    RingWriter,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tier_runtime::{IntervalScheduler, ProfilingOptions};
use tiering_engine::{DeviceLayer, OnlineTiering, PenaltyConfig, SimulatedDevices, TieringConfig};

const PAGE: usize = 4096;
const ARENAS: usize = 8;
const ARENA_BYTES: u64 = 1 << 20;
const EXTENT_BASE: u64 = 0x4000_0000;
const INTERVALS: usize = 40;

struct Row {
    strategy: &'static str,
    moves: u64,
    upper_hits: u64,
    total: u64,
}

fn accesses(arena: usize, interval: usize) -> u64 {
    let hot = if interval < INTERVALS / 2 { arena < 4 } else { arena >= 4 };
    // A little noise so rankings shift between intervals.
    let jitter = ((arena * 7 + interval * 13) % 5) as u64;
    if hot {
        40 + jitter
    } else {
        4 + jitter
    }
}

fn run(strategy: &'static str) -> Result<Row, Box<dyn std::error::Error>> {
    let devices = Arc::new(SimulatedDevices::two_tier(4 * ARENA_BYTES, 64 * ARENA_BYTES));
    let registry = Arc::new(ArenaRegistry::new(RegistryLimits::default())?);

    let mem = InMemoryRing::new(PAGE, 64);
    let mut writer: RingWriter = mem.writer(PAGE);
    let boxed: Box<dyn RingMemory> = Box::new(mem);
    let hw_config = HardwareConfig {
        events: vec![EventSpec::parse("r01d3")?],
        ..HardwareConfig::default()
    };
    let mut hardware = HardwareProfiler::replay(hw_config, vec![(0, RingBuffer::new(boxed, PAGE)?)])?;
    hardware.init()?;
    registry.install_layout(|a| hardware.on_arena_created(a))?;

    for i in 0..ARENAS {
        let arena = registry.create_arena(i as u32)?;
        registry.resize_arena(arena, ARENA_BYTES)?;
        devices.arena_resized(arena, ARENA_BYTES);
        let start = EXTENT_BASE as usize + i * ARENA_BYTES as usize;
        registry.register_extent(arena, start, start + ARENA_BYTES as usize)?;
    }

    let tiering_config = TieringConfig {
        strategy: strategy.to_string(),
        window: 2,
        penalty: PenaltyConfig {
            per_access_penalty: 1.0,
            move_penalty_per_byte: 64.0 / ARENA_BYTES as f64,
        },
        ..TieringConfig::default()
    };
    let options = ProfilingOptions {
        period_ns: 1_000_000,
        alloc_size: None,
        extent_size: None,
        ..ProfilingOptions::default()
    };
    let tiering = OnlineTiering::new(tiering_config, devices.clone())?;
    let t0 = Instant::now();
    let profilers: Vec<Box<dyn Profiler>> = vec![Box::new(hardware)];
    let mut scheduler =
        IntervalScheduler::new(&options, Arc::clone(&registry), profilers, Some(tiering), t0);

    let mut upper_hits = 0;
    let mut total = 0;
    for interval in 0..INTERVALS {
        // Accesses land on whatever tier the arena is on right now.
        let tiers: Vec<Tier> = registry
            .read_profiles()?
            .iter()
            .map(|a| a.classification.tier)
            .collect();
        for (arena, tier) in tiers.iter().enumerate() {
            let n = accesses(arena, interval);
            for k in 0..n {
                let addr = EXTENT_BASE + arena as u64 * ARENA_BYTES + k * 64;
                writer.write_sample(1, addr);
            }
            total += n;
            if *tier == Tier::Upper {
                upper_hits += n;
            }
        }
        writer.publish();
        scheduler.on_tick(t0 + Duration::from_millis(10 * (interval as u64 + 1)));
    }

    let moves = scheduler.metrics().rebinds.moves();
    let (mut profilers, _, _) = scheduler.into_parts();
    for p in &mut profilers {
        p.deinit();
    }
    Ok(Row {
        strategy,
        moves,
        upper_hits,
        total,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!(
        "{:<12} {:>8} {:>14} {:>10}",
        "Strategy", "Moves", "Upper hits", "Hit rate",
    );
    println!("{}", "-".repeat(48));
    for strategy in ["threshold", "penalty"] {
        let row = run(strategy)?;
        println!(
            "{:<12} {:>8} {:>14} {:>9.1}%",
            row.strategy,
            row.moves,
            format!("{}/{}", row.upper_hits, row.total),
            100.0 * row.upper_hits as f64 / row.total as f64,
        );
    }
    Ok(())
}
