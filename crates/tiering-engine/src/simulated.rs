// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! An in-process device layer with capacity accounting.
//!
//! [`SimulatedDevices`] keeps a byte count per device and refuses any move
//! that would push the target past its capacity. It also records each
//! device's high-water mark, which is what the two-phase rebind tests
//! check against.

use crate::{Device, DeviceId, DeviceLayer, DeviceList, RebindError};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone, Copy)]
struct Placement {
    bytes: u64,
    device: Option<DeviceId>,
}

#[derive(Debug, Default)]
struct SimState {
    arenas: HashMap<usize, Placement>,
    used: HashMap<DeviceId, u64>,
    high_water: HashMap<DeviceId, u64>,
    refused: HashSet<usize>,
    moves: u64,
}

impl SimState {
    fn add(&mut self, device: DeviceId, bytes: u64) {
        let used = self.used.entry(device).or_insert(0);
        *used += bytes;
        let hw = self.high_water.entry(device).or_insert(0);
        *hw = (*hw).max(*used);
    }

    fn sub(&mut self, device: DeviceId, bytes: u64) {
        let used = self.used.entry(device).or_insert(0);
        *used = used.saturating_sub(bytes);
    }
}

/// Capacity-checked devices held in memory.
#[derive(Debug)]
pub struct SimulatedDevices {
    devices: Vec<Device>,
    state: Mutex<SimState>,
}

impl SimulatedDevices {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Fast memory on node 0 and capacity memory on node 1.
    pub fn two_tier(upper_bytes: u64, lower_bytes: u64) -> Self {
        Self::new(vec![
            Device {
                id: 0,
                node: 0,
                capacity_bytes: upper_bytes,
                label: "upper".into(),
            },
            Device {
                id: 1,
                node: 1,
                capacity_bytes: lower_bytes,
                label: "lower".into(),
            },
        ])
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>, RebindError> {
        self.state.lock().map_err(|_| RebindError::Failed {
            arena: usize::MAX,
            reason: "device state lock poisoned".into(),
        })
    }

    fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Makes every future move of `arena` fail with a policy rejection.
    pub fn refuse_arena(&self, arena: usize) {
        if let Ok(mut s) = self.state.lock() {
            s.refused.insert(arena);
        }
    }

    /// Largest byte count ever placed on `device`.
    pub fn high_water(&self, device: DeviceId) -> u64 {
        self.state
            .lock()
            .map(|s| s.high_water.get(&device).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Device currently holding `arena`, if it has been placed.
    pub fn placement(&self, arena: usize) -> Option<DeviceId> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.arenas.get(&arena).and_then(|p| p.device))
    }

    /// Number of successful moves.
    pub fn moves(&self) -> u64 {
        self.state.lock().map(|s| s.moves).unwrap_or(0)
    }
}

impl DeviceLayer for SimulatedDevices {
    fn enumerate_devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    fn set_arena_devices(&self, arena: usize, devices: &DeviceList) -> Result<(), RebindError> {
        let mut state = self.state()?;
        if state.refused.contains(&arena) {
            return Err(RebindError::Rejected {
                arena,
                reason: "refused by placement policy".into(),
            });
        }
        let placement = state.arenas.get(&arena).copied().unwrap_or_default();
        if placement.device.is_some_and(|d| devices.contains(d)) {
            return Ok(());
        }

        for id in devices.iter() {
            let device = self.device(id).ok_or(RebindError::UnknownDevice(id))?;
            let used = state.used.get(&id).copied().unwrap_or(0);
            if used + placement.bytes > device.capacity_bytes {
                continue;
            }
            if let Some(old) = placement.device {
                state.sub(old, placement.bytes);
            }
            state.add(id, placement.bytes);
            state.arenas.insert(
                arena,
                Placement {
                    bytes: placement.bytes,
                    device: Some(id),
                },
            );
            state.moves += 1;
            return Ok(());
        }

        Err(RebindError::Rejected {
            arena,
            reason: format!("{} bytes do not fit on devices {devices}", placement.bytes),
        })
    }

    fn capacity(&self, device: DeviceId) -> u64 {
        self.device(device).map(|d| d.capacity_bytes).unwrap_or(0)
    }

    fn used(&self, device: DeviceId) -> u64 {
        self.state
            .lock()
            .map(|s| s.used.get(&device).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn arena_resized(&self, arena: usize, bytes: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let placement = state.arenas.get(&arena).copied().unwrap_or_default();
        if let Some(device) = placement.device {
            state.sub(device, placement.bytes);
            state.add(device, bytes);
        }
        state.arenas.insert(
            arena,
            Placement {
                bytes,
                device: placement.device,
            },
        );
    }
}
