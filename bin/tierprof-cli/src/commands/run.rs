// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tierprof run` command: profile a synthetic workload in this process.
//!
//! Walks the session through its states:
//! ```text
//! ProfilingSession<Idle> → start → <Running> → stop → ProfileReport
//! ```
//!
//! The workload allocates one buffer per arena and keeps touching a hot
//! quarter of them. Halfway through, the hot set moves to the other end,
//! so the tiering engine has a phase change to react to.

use anyhow::Context;
use arena_registry::ByteSize;
use sample_profilers::HardwareConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tier_runtime::{ProfileReport, ProfilingSession, Running};
use tiering_engine::{DeviceLayer, SimulatedDevices, TieringConfig};

/// Arguments of `tierprof run`.
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub arenas: usize,
    pub arena_size: String,
    pub upper_capacity: String,
    pub strategy: Option<String>,
    pub duration_ms: u64,
    pub hardware: bool,
    pub json: Option<PathBuf>,
}

const BURST: Duration = Duration::from_millis(2);
const STRIDE: usize = 4096;

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           tierprof · Profile and Tier               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    anyhow::ensure!(args.arenas > 0, "need at least one arena");
    let arena_size = ByteSize::parse(&args.arena_size)
        .map_err(|e| anyhow::anyhow!("invalid arena size: {e}"))?;
    let upper = ByteSize::parse(&args.upper_capacity)
        .map_err(|e| anyhow::anyhow!("invalid upper capacity: {e}"))?;

    let mut options = super::load_options(args.config.as_deref())?;
    if args.hardware && options.hardware.is_none() {
        options.hardware = Some(HardwareConfig::default());
    }
    let tiering = options.tiering.get_or_insert_with(TieringConfig::default);
    if let Some(strategy) = args.strategy {
        tiering.strategy = strategy;
    }
    options.validate()?;

    println!("  Config:");
    println!("   Arenas:   {} x {arena_size}", args.arenas);
    println!("   Upper:    {upper}");
    println!("   Period:   {:?}", options.period());
    println!("   Strategy: {}", tiering_strategy(&options));
    println!("   Hardware: {}", if options.hardware.is_some() { "on" } else { "off" });
    println!("   Duration: {} ms", args.duration_ms);
    println!();

    // ── Session ────────────────────────────────────────────────
    let devices = Arc::new(SimulatedDevices::two_tier(upper.as_bytes(), u64::MAX / 2));
    let session = ProfilingSession::new(options, devices.clone())?;

    println!("  [1/3] Allocating arenas...");
    let len = usize::try_from(arena_size.as_bytes()).context("arena size does not fit in memory")?;
    let mut buffers: Vec<Vec<u8>> = Vec::with_capacity(args.arenas);
    let mut indices = Vec::with_capacity(args.arenas);
    for site in 0..args.arenas {
        let buffer = vec![0u8; len];
        let index = session.create_arena(site as u32)?;
        let start = buffer.as_ptr() as usize;
        session.on_extent_created(index, start, start + len)?;
        session.on_arena_resized(index, 0)?;
        buffers.push(buffer);
        indices.push(index);
    }
    println!("        {} arenas registered.", indices.len());
    println!();

    println!("  [2/3] Running workload...");
    let running = session.start()?;
    run_workload(&running, &mut buffers, &indices, Duration::from_millis(args.duration_ms)).await?;
    println!();

    println!("  [3/3] Stopping...");
    let report = running.stop()?;
    drop(buffers);
    println!();

    print_report(&report);
    println!("  Devices:");
    println!(
        "   upper used {} (high water {}), {} moves",
        ByteSize::from_bytes(devices.used(0)),
        ByteSize::from_bytes(devices.high_water(0)),
        devices.moves()
    );
    println!();

    if let Some(path) = args.json {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &report)?;
        println!("  Report written to {}", path.display());
    }

    Ok(())
}

/// Touches the hot quarter of the buffers in short bursts, yielding to the
/// timer in between. Hot arenas grow as they are touched.
async fn run_workload(
    session: &ProfilingSession<Running>,
    buffers: &mut [Vec<u8>],
    indices: &[usize],
    duration: Duration,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let hot = (buffers.len() / 4).max(1);
    let mut touched = vec![0usize; buffers.len()];
    let mut round: u8 = 0;

    while started.elapsed() < duration {
        let second_phase = started.elapsed() >= duration / 2;
        let range = if second_phase {
            buffers.len() - hot..buffers.len()
        } else {
            0..hot
        };

        let burst = Instant::now();
        while burst.elapsed() < BURST {
            for i in range.clone() {
                let buffer = &mut buffers[i];
                let reach = (touched[i] + STRIDE * 16).min(buffer.len());
                for offset in (0..reach).step_by(STRIDE) {
                    buffer[offset] = buffer[offset].wrapping_add(round);
                }
                if reach > touched[i] {
                    touched[i] = reach;
                    session.on_arena_resized(indices[i], reach as u64)?;
                }
            }
        }
        round = round.wrapping_add(1);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    tracing::info!(
        "workload done after {} intervals",
        session.intervals_completed()
    );
    Ok(())
}

fn tiering_strategy(options: &tier_runtime::ProfilingOptions) -> &str {
    options
        .tiering
        .as_ref()
        .map(|t| t.strategy.as_str())
        .unwrap_or("none")
}

fn print_report(report: &ProfileReport) {
    println!("  Results:");
    println!("   {}", report.summary());
    if let Some(stats) = &report.tiering {
        println!(
            "   tiering: {} steps, {} skipped, {} hot at the end",
            stats.steps,
            stats.skipped,
            ByteSize::from_bytes(stats.hot_bytes)
        );
    }
    println!();
    println!("  {:>5}  {:>6}  {:>4}  {:>10}  {:>10}", "arena", "tier", "hot", "size", "samples");
    for arena in &report.arenas {
        let size = arena
            .alloc_size
            .as_ref()
            .and_then(|s| s.values().last().copied())
            .unwrap_or(0);
        let samples: u64 = arena
            .events
            .iter()
            .flatten()
            .map(|series| series.values().iter().sum::<u64>())
            .sum();
        println!(
            "  {:>5}  {:>6}  {:>4}  {:>10}  {:>10}",
            arena.index(),
            arena.classification.tier.to_string(),
            arena.classification.hot_intervals,
            ByteSize::from_bytes(size).to_string(),
            samples
        );
    }
    println!();
}
