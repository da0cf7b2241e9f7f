// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tierprof status` command: report what this host lets the profilers do.
//!
//! Reads procfs and sysfs, then tries to open the default hardware
//! profiler. Nothing here fails the command; missing files are shown as
//! unavailable.

use sample_profilers::perf::{online_cpus, page_size};
use sample_profilers::{HardwareConfig, HardwareProfiler, Profiler};
use std::path::Path;

pub fn execute() -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           tierprof · Host Capabilities              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── System ─────────────────────────────────────────────────
    println!("  System");
    println!("   Page size:    {} bytes", page_size());
    println!("   Online CPUs:  {}", online_cpus());
    let nodes = numa_nodes();
    if nodes.is_empty() {
        println!("   NUMA nodes:   unavailable");
    } else {
        println!("   NUMA nodes:   {nodes:?}");
    }
    println!();

    // ── Sampling ───────────────────────────────────────────────
    println!("  Sampling");
    match read_trimmed("/proc/sys/kernel/perf_event_paranoid") {
        Some(level) => println!("   perf_event_paranoid: {level}"),
        None => println!("   perf_event_paranoid: unavailable"),
    }
    let pagemap = std::fs::File::open("/proc/self/pagemap").is_ok();
    println!(
        "   pagemap:      {}",
        if pagemap { "readable" } else { "not readable" }
    );

    let mut hardware = HardwareProfiler::new(HardwareConfig::default())?;
    match hardware.init() {
        Ok(()) => {
            println!("   perf events:  available");
            hardware.deinit();
        }
        Err(e) => {
            tracing::debug!("hardware profiler init failed: {e}");
            println!("   perf events:  unavailable ({e})");
        }
    }
    println!();

    Ok(())
}

fn read_trimmed(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Node ids listed under `/sys/devices/system/node`.
fn numa_nodes() -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir("/sys/devices/system/node") else {
        return Vec::new();
    };
    let mut nodes: Vec<u32> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("node"))
                .and_then(|id| id.parse().ok())
        })
        .collect();
    nodes.sort_unstable();
    nodes
}
