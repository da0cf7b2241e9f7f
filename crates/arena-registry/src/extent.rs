// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Address-range to arena mapping.
//!
//! The extent table is read once per hardware sample and written only when
//! the allocator maps or unmaps an extent, so it sits behind an `RwLock`.
//! Samplers take one read guard for a whole drain via [`ExtentTable::read`].

use crate::RegistryError;
use std::sync::{RwLock, RwLockReadGuard};

/// One contiguous range `[start, end)` backing an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Extent {
    pub start: usize,
    pub end: usize,
    /// Index of the owning arena.
    pub arena: usize,
}

impl Extent {
    /// Returns `true` if `addr` falls inside `[start, end)`.
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Span of the extent in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// The set of live extents.
#[derive(Debug, Default)]
pub struct ExtentTable {
    extents: RwLock<Vec<Extent>>,
}

impl ExtentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `[start, end)` for `arena`. A range already registered at the same
    /// start is replaced (extents are re-registered when they grow in place).
    pub fn register(&self, arena: usize, start: usize, end: usize) -> Result<(), RegistryError> {
        if end <= start {
            return Err(RegistryError::InvalidExtent { start, end });
        }
        let mut extents = self.extents.write().map_err(|_| RegistryError::LockPoisoned)?;
        let extent = Extent { start, end, arena };
        match extents.iter_mut().find(|e| e.start == start) {
            Some(existing) => *existing = extent,
            None => extents.push(extent),
        }
        Ok(())
    }

    /// Removes the extent starting at `start`.
    ///
    /// Returns `Ok(false)` when no such extent is registered; removal is
    /// idempotent.
    pub fn unregister(&self, start: usize) -> Result<bool, RegistryError> {
        let mut extents = self.extents.write().map_err(|_| RegistryError::LockPoisoned)?;
        match extents.iter().position(|e| e.start == start) {
            Some(pos) => {
                extents.swap_remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Takes a read guard for a batch of lookups.
    pub fn read(&self) -> Result<ExtentReadGuard<'_>, RegistryError> {
        let guard = self.extents.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(ExtentReadGuard { guard })
    }

    /// Resolves a single address. Prefer [`ExtentTable::read`] for batches.
    pub fn resolve(&self, addr: usize) -> Option<usize> {
        self.read().ok().and_then(|g| g.resolve(addr))
    }

    /// Number of registered extents.
    pub fn len(&self) -> usize {
        self.extents.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read access to the extent table, held for the duration of a drain.
pub struct ExtentReadGuard<'a> {
    guard: RwLockReadGuard<'a, Vec<Extent>>,
}

impl ExtentReadGuard<'_> {
    /// Returns the arena whose extent contains `addr`, or `None`.
    ///
    /// Linear in the number of extents.
    pub fn resolve(&self, addr: usize) -> Option<usize> {
        self.guard.iter().find(|e| e.contains(addr)).map(|e| e.arena)
    }

    /// All extents, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.guard.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_half_open() {
        let t = ExtentTable::new();
        t.register(3, 0x1000, 0x2000).unwrap();
        assert_eq!(t.resolve(0x1000), Some(3));
        assert_eq!(t.resolve(0x1fff), Some(3));
        assert_eq!(t.resolve(0x2000), None);
        assert_eq!(t.resolve(0x0fff), None);
    }

    #[test]
    fn test_resolve_uncovered_is_none() {
        let t = ExtentTable::new();
        assert_eq!(t.resolve(0xdead_beef), None);
        t.register(0, 0x1000, 0x2000).unwrap();
        assert_eq!(t.resolve(0), None);
    }

    #[test]
    fn test_multiple_extents_per_arena() {
        let t = ExtentTable::new();
        t.register(1, 0x1000, 0x2000).unwrap();
        t.register(1, 0x8000, 0x9000).unwrap();
        t.register(2, 0x2000, 0x3000).unwrap();
        let g = t.read().unwrap();
        assert_eq!(g.resolve(0x8800), Some(1));
        assert_eq!(g.resolve(0x2800), Some(2));
        assert_eq!(g.iter().count(), 3);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let t = ExtentTable::new();
        assert!(!t.unregister(0x4000).unwrap());
        t.register(0, 0x4000, 0x5000).unwrap();
        assert!(t.unregister(0x4000).unwrap());
        assert!(!t.unregister(0x4000).unwrap());
        assert_eq!(t.resolve(0x4800), None);
    }

    #[test]
    fn test_register_replaces_same_start() {
        let t = ExtentTable::new();
        t.register(0, 0x1000, 0x2000).unwrap();
        t.register(0, 0x1000, 0x4000).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.resolve(0x3000), Some(0));
    }

    #[test]
    fn test_register_rejects_empty_range() {
        let t = ExtentTable::new();
        let err = t.register(0, 0x2000, 0x2000).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidExtent { .. }));
        assert!(!err.is_fatal());
    }
}
