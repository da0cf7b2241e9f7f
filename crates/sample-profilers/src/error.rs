// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the sampling profilers.

use arena_registry::RegistryError;

/// Errors raised while setting up or running a profiler.
///
/// Failures to acquire hardware resources at init are fatal to the
/// session; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum ProfilerError {
    /// The host does not support this profiler (non-Linux, or perf disabled).
    #[error("profiler not available: {0}")]
    NotAvailable(String),

    /// `perf_event_open` failed for one (event, cpu) pair.
    #[error("failed to open perf event '{event}' on cpu {cpu}: {source}")]
    PerfOpen {
        event: String,
        cpu: i32,
        source: std::io::Error,
    },

    /// Mapping a sample ring failed.
    #[error("failed to map sample ring for '{event}': {source}")]
    Mmap {
        event: String,
        source: std::io::Error,
    },

    /// Failed to open or read a procfs file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// An event name could not be parsed.
    #[error("unknown perf event '{0}' (expected a known name or rXXXX)")]
    InvalidEvent(String),

    /// A profiler option is out of range.
    #[error("invalid profiler configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
