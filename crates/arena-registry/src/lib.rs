// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # arena-registry
//!
//! Bookkeeping for the memory regions ("arenas") a tiering allocator places
//! on fast or slow memory, together with the per-interval history the
//! profilers record for them.
//!
//! # Key Components
//!
//! - [`ArenaRegistry`]: the shared entry point: arena creation, site
//!   addition, extent registration, address resolution and live sizes.
//! - [`ArenaTable`]: everything behind the profile lock: one
//!   [`ArenaProfile`] per arena and the list of [`IntervalSnapshot`]s.
//! - [`ExtentTable`]: `[start, end)` ranges mapped to arena indices.
//! - [`Series`]: a gap-free per-interval history with total and peak.
//! - [`ByteSize`]: human-readable sizes (`"512M"`, `"1G"`).
//!
//! # Data Flow
//!
//! ```text
//!  allocator threads                      control thread
//!  ─────────────────                      ──────────────
//!  create_arena / add_site ──┐         ┌── lock_profiles()
//!                            ▼         ▼
//!                        ArenaTable (RwLock) ── fold ── IntervalSnapshot
//!  register_extent ────► ExtentTable (RwLock) ◄── resolve(addr)
//!  resize_arena ───────► ArenaSizes (atomics) ◄── alloc-size profiler
//! ```
//!
//! # Example
//! ```
//! use arena_registry::{ArenaRegistry, RegistryLimits};
//!
//! let registry = ArenaRegistry::new(RegistryLimits::default()).unwrap();
//! let arena = registry.create_arena(7).unwrap();
//! registry.register_extent(arena, 0x1000, 0x3000).unwrap();
//!
//! assert_eq!(registry.resolve(0x2000), Some(arena));
//! assert_eq!(registry.resolve(0x3000), None);
//! ```

mod error;
mod extent;
mod profile;
mod registry;
mod series;
mod size;
mod snapshot;
mod table;

pub use error::RegistryError;
pub use extent::{Extent, ExtentReadGuard, ExtentTable};
pub use profile::{ArenaProfile, ResidentRecord, SiteId, Tier, TierClassification};
pub use registry::{ArenaRegistry, ArenaSizes};
pub use series::Series;
pub use size::ByteSize;
pub use snapshot::{ArenaSample, IntervalSnapshot};
pub use table::{ArenaTable, RegistryLimits};
