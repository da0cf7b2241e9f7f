// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tierprof
//!
//! Command-line front end for the tiered-memory profiler.
//!
//! ## Usage
//! ```bash
//! # Profile a synthetic workload in this process
//! tierprof run --arenas 8 --arena-size 4M --upper-capacity 8M --duration-ms 2000
//!
//! # Print the default options, or validate a file
//! tierprof config
//! tierprof --config profile.toml config
//!
//! # Check whether this host allows hardware sampling
//! tierprof status
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tierprof",
    about = "Interval-based memory profiling and online tiering",
    version,
    author
)]
struct Cli {
    /// Path to a TOML options file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile and tier a synthetic workload running in this process.
    Run {
        /// Number of arenas to allocate.
        #[arg(short, long, default_value_t = 8)]
        arenas: usize,

        /// Size of each arena (e.g., "4M").
        #[arg(long, default_value = "4M")]
        arena_size: String,

        /// Capacity of the simulated upper tier (e.g., "8M").
        #[arg(long, default_value = "8M")]
        upper_capacity: String,

        /// Classification strategy: threshold or penalty.
        #[arg(short, long)]
        strategy: Option<String>,

        /// How long to run the workload.
        #[arg(short, long, default_value_t = 2000)]
        duration_ms: u64,

        /// Sample page faults through perf (needs perf_event_paranoid <= 2).
        #[arg(long)]
        hardware: bool,

        /// Write the full report as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Print the effective options as TOML.
    Config,

    /// Report whether hardware sampling and pagemap reads are available.
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            arenas,
            arena_size,
            upper_capacity,
            strategy,
            duration_ms,
            hardware,
            json,
        } => {
            let args = commands::run::RunArgs {
                config: cli.config,
                arenas,
                arena_size,
                upper_capacity,
                strategy,
                duration_ms,
                hardware,
                json,
            };
            commands::run::execute(args).await
        }
        Commands::Config => commands::config::execute(cli.config),
        Commands::Status => commands::status::execute(),
    }
}
