// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tiering-engine
//!
//! Decides which arenas belong on the fast memory tier and moves them
//! there without ever overfilling it.
//!
//! # Strategies
//!
//! | Strategy | Config name | Promotes when | Demotes when |
//! |---|---|---|---|
//! | [`ThresholdStrategy`] | `threshold` / `orig` | arena ranks inside the packed hot set | arena falls out of it |
//! | [`PenaltyStrategy`] | `penalty` / `ski` | stay-penalty reaches move-penalty | its space is needed by a promotion |
//!
//! Both rank arenas by sampled accesses per byte over a recent window.
//!
//! # Trait-Based Extensibility
//!
//! All strategies implement [`ClassificationStrategy`], so new policies can
//! be added without modifying the scheduler:
//!
//! ```ignore
//! struct AlwaysCold;
//! impl ClassificationStrategy for AlwaysCold {
//!     fn name(&self) -> &str { "cold" }
//!     fn classify(&mut self, arenas: &[ArenaMetrics], _cap: u64) -> Vec<bool> {
//!         vec![false; arenas.len()]
//!     }
//! }
//! ```
//!
//! # Example
//! ```
//! use arena_registry::{ArenaRegistry, RegistryLimits, Tier};
//! use std::sync::Arc;
//! use tiering_engine::{OnlineTiering, SimulatedDevices, TieringConfig};
//!
//! let devices = Arc::new(SimulatedDevices::two_tier(1 << 20, 1 << 30));
//! let registry = ArenaRegistry::new(RegistryLimits::default()).unwrap();
//! let arena = registry.create_arena(1).unwrap();
//! registry.resize_arena(arena, 4096).unwrap();
//!
//! let mut tiering = OnlineTiering::new(TieringConfig::default(), devices).unwrap();
//! let mut table = registry.lock_profiles().unwrap();
//! tiering.step(&mut table, registry.sizes());
//! assert_eq!(table.get(arena).unwrap().classification.tier, Tier::Upper);
//! ```

mod device;
mod engine;
mod error;
pub mod rebind;
mod simulated;
pub mod strategy;

pub use device::{select_tiers, Device, DeviceId, DeviceLayer, DeviceList, TierDevices};
pub use engine::{OnlineTiering, TieringConfig, TieringStats};
pub use error::{RebindError, TieringError};
pub use rebind::RebindOutcome;
pub use simulated::SimulatedDevices;
pub use strategy::{
    create_strategy, ArenaMetrics, ClassificationStrategy, PenaltyConfig, PenaltyStrategy,
    ThresholdStrategy,
};
