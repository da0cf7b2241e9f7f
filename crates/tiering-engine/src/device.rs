// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The device layer boundary and tier selection.
//!
//! The engine never touches memory itself. It asks a [`DeviceLayer`] to
//! bind an arena to a [`DeviceList`], and reads device capacities to size
//! the hot set. A NUMA binding layer and the in-process
//! [`crate::SimulatedDevices`] both sit behind this trait.

use crate::{RebindError, TieringError};
use std::fmt;

pub type DeviceId = u32;

/// One memory device as reported by the device layer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// NUMA node the device is exposed as.
    pub node: i32,
    pub capacity_bytes: u64,
    pub label: String,
}

/// An ordered set of devices an arena may be bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceList(Vec<DeviceId>);

impl DeviceList {
    pub fn new(ids: Vec<DeviceId>) -> Self {
        Self(ids)
    }

    pub fn iter(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeviceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

/// Device primitives the tiering engine relies on.
///
/// Shared between allocator threads (`arena_resized`) and the control
/// thread (`set_arena_devices`), so every method takes `&self`.
pub trait DeviceLayer: Send + Sync {
    fn enumerate_devices(&self) -> Vec<Device>;

    /// Moves an arena's backing memory onto `devices`.
    fn set_arena_devices(&self, arena: usize, devices: &DeviceList) -> Result<(), RebindError>;

    fn capacity(&self, device: DeviceId) -> u64;

    fn used(&self, device: DeviceId) -> u64;

    /// Notifies the layer that an arena's live size changed.
    fn arena_resized(&self, _arena: usize, _bytes: u64) {}
}

/// The device lists for the two tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDevices {
    pub upper: DeviceList,
    pub lower: DeviceList,
}

impl TierDevices {
    /// Total capacity of the upper tier.
    pub fn upper_capacity(&self, layer: &dyn DeviceLayer) -> u64 {
        self.upper.iter().map(|d| layer.capacity(d)).sum()
    }

    /// Bytes currently placed on the upper tier.
    pub fn upper_used(&self, layer: &dyn DeviceLayer) -> u64 {
        self.upper.iter().map(|d| layer.used(d)).sum()
    }
}

/// Splits `devices` into tiers by NUMA node.
pub fn select_tiers(
    devices: &[Device],
    upper_nodes: &[i32],
    lower_nodes: &[i32],
) -> Result<TierDevices, TieringError> {
    if let Some(&node) = upper_nodes.iter().find(|n| lower_nodes.contains(n)) {
        return Err(TieringError::OverlappingTiers(node));
    }
    let pick = |nodes: &[i32]| {
        DeviceList::new(
            devices
                .iter()
                .filter(|d| nodes.contains(&d.node))
                .map(|d| d.id)
                .collect(),
        )
    };
    let upper = pick(upper_nodes);
    if upper.is_empty() {
        return Err(TieringError::NoUpperDevices(upper_nodes.to_vec()));
    }
    let lower = pick(lower_nodes);
    if lower.is_empty() {
        return Err(TieringError::NoLowerDevices(lower_nodes.to_vec()));
    }
    tracing::debug!("selected upper tier {upper} and lower tier {lower}");
    Ok(TierDevices { upper, lower })
}
