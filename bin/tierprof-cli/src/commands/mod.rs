// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

pub mod config;
pub mod run;
pub mod status;

use std::path::Path;
use tier_runtime::ProfilingOptions;
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads options from `path`, or the defaults.
pub fn load_options(path: Option<&Path>) -> anyhow::Result<ProfilingOptions> {
    match path {
        Some(p) => Ok(ProfilingOptions::load(p)?),
        None => Ok(ProfilingOptions::default()),
    }
}
