// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # sample-profilers
//!
//! Independent measurement sources that each record one value per arena
//! per interval.
//!
//! # Profilers
//! - **Hardware**: perf sample rings drained every interval; sampled data
//!   addresses are resolved to arenas through the extent table.
//! - **Resident set**: present and non-present bytes per arena from
//!   `/proc/self/pagemap`.
//! - **Extent size**: total mapped span per arena.
//! - **Allocation size**: live bytes per arena.
//!
//! All four implement [`Profiler`]. The scheduler calls [`Profiler::run`]
//! while holding the profile lock, then folds each arena with
//! [`Profiler::on_interval`] or, on intervals the profiler skips,
//! [`Profiler::on_skip_interval`].
//!
//! # Platform
//! Hardware sampling needs Linux and a `perf_event_paranoid` setting that
//! allows user-space sampling. Elsewhere [`HardwareProfiler`] fails at
//! `init` with [`ProfilerError::NotAvailable`].
//!
//! # Example
//! ```
//! use arena_registry::{ArenaRegistry, RegistryLimits};
//! use sample_profilers::{AllocSizeConfig, AllocSizeProfiler, Profiler, SampleContext};
//!
//! let registry = ArenaRegistry::new(RegistryLimits::default()).unwrap();
//! let mut profiler = AllocSizeProfiler::new(AllocSizeConfig::default());
//! registry.install_layout(|arena| profiler.on_arena_created(arena)).unwrap();
//!
//! let arena = registry.create_arena(1).unwrap();
//! registry.resize_arena(arena, 4096).unwrap();
//!
//! let mut table = registry.lock_profiles().unwrap();
//! let mut ctx = SampleContext {
//!     table: &mut table,
//!     extents: registry.extents(),
//!     sizes: registry.sizes(),
//! };
//! profiler.run(&mut ctx).unwrap();
//! profiler.on_interval(table.get_mut(arena).unwrap());
//! assert_eq!(table.get(arena).unwrap().alloc_size.as_ref().unwrap().last(), Some(4096));
//! ```

mod allocs;
mod error;
mod extent_size;
mod hardware;
pub mod perf;
mod profiler;
mod resident;
pub mod ring;

pub use allocs::{AllocSizeConfig, AllocSizeProfiler};
pub use error::ProfilerError;
pub use extent_size::{ExtentSizeConfig, ExtentSizeProfiler};
pub use hardware::{HardwareConfig, HardwareProfiler, HardwareStats};
pub use perf::EventSpec;
pub use profiler::{Profiler, ProfilerKind, SampleContext, SkipCounter};
pub use resident::{ResidentConfig, ResidentSetProfiler};
pub use ring::{InMemoryRing, RingBuffer, RingMemory, RingWriter};
