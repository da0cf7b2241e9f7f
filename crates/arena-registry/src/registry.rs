// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The shared arena registry.
//!
//! [`ArenaRegistry`] is the one object allocator threads and the profiling
//! control thread both hold (via `Arc`). It combines three pieces with
//! different synchronization needs:
//!
//! | Piece            | Written by                 | Guard             |
//! |------------------|----------------------------|-------------------|
//! | [`ArenaTable`]   | arena creation, intervals  | profile `RwLock`  |
//! | [`ExtentTable`]  | extent map/unmap           | extent `RwLock`   |
//! | [`ArenaSizes`]   | every size change          | none (atomics)    |
//!
//! # Lock Order
//! Profile lock before extent lock. A hardware drain takes the extent read
//! lock while the scheduler already holds the profile lock; nothing takes
//! them the other way round.

use crate::{ArenaProfile, ArenaTable, ExtentTable, RegistryError, RegistryLimits, SiteId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Live byte size per arena index, updated without locking.
#[derive(Debug)]
pub struct ArenaSizes {
    slots: Box<[AtomicU64]>,
}

impl ArenaSizes {
    pub fn new(max_arenas: usize) -> Self {
        Self {
            slots: (0..max_arenas).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Current size of arena `index`; zero for indices out of range.
    pub fn get(&self, index: usize) -> u64 {
        self.slots
            .get(index)
            .map(|s| s.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Stores a new size. Returns `false` if `index` is out of range.
    pub fn set(&self, index: usize, bytes: u64) -> bool {
        match self.slots.get(index) {
            Some(slot) => {
                slot.store(bytes, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Arenas, extents and profile history for one process.
#[derive(Debug)]
pub struct ArenaRegistry {
    limits: RegistryLimits,
    profiles: RwLock<ArenaTable>,
    extents: ExtentTable,
    sizes: ArenaSizes,
}

impl ArenaRegistry {
    pub fn new(limits: RegistryLimits) -> Result<Self, RegistryError> {
        limits.validate()?;
        Ok(Self {
            limits,
            profiles: RwLock::new(ArenaTable::new(limits)),
            extents: ExtentTable::new(),
            sizes: ArenaSizes::new(limits.max_arenas),
        })
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    /// Takes the exclusive profile lock.
    ///
    /// A poisoned lock is reported as [`RegistryError::LockPoisoned`]; the
    /// scheduler abandons the interval when it sees one.
    pub fn lock_profiles(&self) -> Result<RwLockWriteGuard<'_, ArenaTable>, RegistryError> {
        self.profiles.write().map_err(|_| RegistryError::LockPoisoned)
    }

    /// Shared access to the profile table for reporting.
    pub fn read_profiles(&self) -> Result<RwLockReadGuard<'_, ArenaTable>, RegistryError> {
        self.profiles.read().map_err(|_| RegistryError::LockPoisoned)
    }

    /// Creates an arena at the next free index.
    pub fn create_arena(&self, site: SiteId) -> Result<usize, RegistryError> {
        self.lock_profiles()?.create_arena(site)
    }

    /// Creates an arena at an index chosen by the allocator.
    pub fn insert_arena(&self, index: usize, site: SiteId) -> Result<(), RegistryError> {
        self.lock_profiles()?.insert_arena(index, site)
    }

    pub fn add_site(&self, index: usize, site: SiteId) -> Result<(), RegistryError> {
        self.lock_profiles()?.add_site(index, site)
    }

    /// Installs the per-profiler sub-record layout on every current and
    /// future arena.
    pub fn install_layout(&self, init: impl FnOnce(&mut ArenaProfile)) -> Result<(), RegistryError> {
        self.lock_profiles()?.install_layout(init);
        Ok(())
    }

    /// Records an arena's new live size. Never blocks.
    pub fn resize_arena(&self, index: usize, bytes: u64) -> Result<(), RegistryError> {
        if self.sizes.set(index, bytes) {
            Ok(())
        } else {
            Err(RegistryError::ArenaLimitExceeded {
                index,
                max_arenas: self.limits.max_arenas,
            })
        }
    }

    pub fn arena_size(&self, index: usize) -> u64 {
        self.sizes.get(index)
    }

    pub fn sizes(&self) -> &ArenaSizes {
        &self.sizes
    }

    pub fn register_extent(&self, arena: usize, start: usize, end: usize) -> Result<(), RegistryError> {
        if arena >= self.limits.max_arenas {
            return Err(RegistryError::ArenaLimitExceeded {
                index: arena,
                max_arenas: self.limits.max_arenas,
            });
        }
        self.extents.register(arena, start, end)
    }

    /// Removes the extent starting at `start`. Unknown starts succeed.
    pub fn unregister_extent(&self, start: usize) -> Result<(), RegistryError> {
        if !self.extents.unregister(start)? {
            tracing::debug!("extent at {start:#x} was not registered");
        }
        Ok(())
    }

    /// Maps an address to its arena, or `None` if no extent covers it.
    pub fn resolve(&self, addr: usize) -> Option<usize> {
        self.extents.resolve(addr)
    }

    pub fn extents(&self) -> &ExtentTable {
        &self.extents
    }
}
