// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tier-runtime
//!
//! The interval scheduler and the profiling session an allocator runtime
//! drives.
//!
//! The runtime takes:
//! - [`ProfilingOptions`] naming the period, the enabled profilers and the
//!   tiering policy.
//! - A [`tiering_engine::DeviceLayer`] that can move arenas between memory
//!   devices.
//!
//! And, once per period, measures every arena, folds the measurements into
//! per-arena history, reclassifies arenas hot or cold and rebinds them.
//!
//! # Type-State Lifecycle
//! ```text
//! ProfilingSession<Idle> → ProfilingSession<Running> → ProfileReport
//! ```
//! Allocator hooks work in both states; `stop` only exists on a running
//! session.
//!
//! # Threading
//! Allocator threads call the hooks concurrently. The session's control
//! thread owns the profilers and the tiering engine and serialises every
//! interval against arena creation through the registry's profile lock.

mod config;
mod error;
mod metrics;
pub mod scheduler;
mod session;

pub use config::ProfilingOptions;
pub use error::RuntimeError;
pub use metrics::SchedulerMetrics;
pub use scheduler::{IntervalScheduler, TickOutcome};
pub use session::{Idle, ProfileReport, ProfilingSession, Running, SessionState};
