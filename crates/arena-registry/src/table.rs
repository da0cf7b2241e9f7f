// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The arena table guarded by the profile lock.
//!
//! Everything in an [`ArenaTable`] is mutated under one exclusive lock:
//! arena creation, site addition, the per-interval fold, classification and
//! snapshot publication. That lock totally orders interval processing
//! against arena creation, so no arena ever appears halfway through a fold.

use crate::{
    ArenaProfile, ArenaSample, ArenaSizes, IntervalSnapshot, RegistryError, SiteId,
};
use std::time::Duration;

/// Capacity limits for the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RegistryLimits {
    pub max_arenas: usize,
    pub max_sites_per_arena: usize,
}

impl RegistryLimits {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.max_arenas == 0 {
            return Err(RegistryError::InvalidLimits("max_arenas must be at least 1".into()));
        }
        if self.max_sites_per_arena == 0 {
            return Err(RegistryError::InvalidLimits(
                "max_sites_per_arena must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_arenas: 4096,
            max_sites_per_arena: 256,
        }
    }
}

/// Indexable table of arena profiles plus the interval bookkeeping.
#[derive(Debug)]
pub struct ArenaTable {
    limits: RegistryLimits,
    slots: Vec<Option<ArenaProfile>>,
    live: usize,
    intervals_completed: u64,
    /// Blank profile carrying one empty sub-record per enabled profiler.
    /// New arenas copy their sub-records from it.
    template: ArenaProfile,
    snapshots: Vec<IntervalSnapshot>,
}

impl ArenaTable {
    pub(crate) fn new(limits: RegistryLimits) -> Self {
        Self {
            limits,
            slots: Vec::new(),
            live: 0,
            intervals_completed: 0,
            template: ArenaProfile::new(0, 0, 0, 1),
            snapshots: Vec::new(),
        }
    }

    /// Creates an arena at the lowest free index.
    pub fn create_arena(&mut self, site: SiteId) -> Result<usize, RegistryError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len());
        self.insert_arena(index, site)?;
        Ok(index)
    }

    /// Creates an arena at an allocator-chosen index.
    pub fn insert_arena(&mut self, index: usize, site: SiteId) -> Result<(), RegistryError> {
        if index >= self.limits.max_arenas {
            return Err(RegistryError::ArenaLimitExceeded {
                index,
                max_arenas: self.limits.max_arenas,
            });
        }
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        if self.slots[index].is_some() {
            return Err(RegistryError::ArenaSlotOccupied { index });
        }

        let mut profile = ArenaProfile::new(
            index,
            site,
            self.intervals_completed,
            self.limits.max_sites_per_arena,
        );
        copy_records(&self.template, &mut profile);
        self.slots[index] = Some(profile);
        self.live += 1;
        tracing::debug!(
            "arena {index} created for site {site} at interval {}",
            self.intervals_completed
        );
        Ok(())
    }

    /// Appends an allocation site to an existing arena.
    pub fn add_site(&mut self, index: usize, site: SiteId) -> Result<(), RegistryError> {
        let max_sites = self.limits.max_sites_per_arena;
        let profile = self
            .get_mut(index)
            .ok_or(RegistryError::UnknownArena { index })?;
        if profile.sites().len() >= max_sites {
            return Err(RegistryError::SiteLimitExceeded { index, max_sites });
        }
        profile.push_site(site);
        Ok(())
    }

    /// Installs the per-profiler record layout.
    ///
    /// `init` is applied to a blank template that every later arena copies.
    /// Arenas that already exist receive the same empty records.
    pub fn install_layout(&mut self, init: impl FnOnce(&mut ArenaProfile)) {
        let mut template = ArenaProfile::new(0, 0, 0, 1);
        init(&mut template);
        for profile in self.slots.iter_mut().flatten() {
            copy_records(&template, profile);
        }
        self.template = template;
    }

    pub fn get(&self, index: usize) -> Option<&ArenaProfile> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ArenaProfile> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Live arenas in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ArenaProfile> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ArenaProfile> {
        self.slots.iter_mut().flatten()
    }

    /// Number of live arenas.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    /// Number of intervals whose fold has completed.
    pub fn intervals_completed(&self) -> u64 {
        self.intervals_completed
    }

    /// Closes the current interval: captures a snapshot of every arena's
    /// freshly folded values and advances the interval counter.
    pub fn complete_interval(&mut self, sizes: &ArenaSizes, duration: Duration) -> &IntervalSnapshot {
        let interval = self.intervals_completed;
        let arenas = self
            .iter()
            .map(|p| ArenaSample::capture(p, sizes.get(p.index()), interval))
            .collect();
        self.snapshots.push(IntervalSnapshot {
            index: interval,
            duration,
            arenas,
        });
        self.intervals_completed += 1;
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Completed interval snapshots, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &IntervalSnapshot> {
        self.snapshots.iter()
    }

    /// Removes and returns all stored snapshots.
    pub fn take_snapshots(&mut self) -> Vec<IntervalSnapshot> {
        std::mem::take(&mut self.snapshots)
    }
}

fn copy_records(template: &ArenaProfile, profile: &mut ArenaProfile) {
    if profile.events.is_none() {
        profile.events = template.events.clone();
    }
    if profile.resident.is_none() {
        profile.resident = template.resident.clone();
    }
    if profile.alloc_size.is_none() {
        profile.alloc_size = template.alloc_size.clone();
    }
    if profile.extent_size.is_none() {
        profile.extent_size = template.extent_size.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Series;

    fn table(max_arenas: usize, max_sites: usize) -> ArenaTable {
        ArenaTable::new(RegistryLimits {
            max_arenas,
            max_sites_per_arena: max_sites,
        })
    }

    #[test]
    fn test_create_assigns_sequential_indices() {
        let mut t = table(8, 4);
        assert_eq!(t.create_arena(10).unwrap(), 0);
        assert_eq!(t.create_arena(11).unwrap(), 1);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1).unwrap().sites(), &[11]);
    }

    #[test]
    fn test_create_skips_inserted_indices() {
        let mut t = table(8, 4);
        t.insert_arena(0, 1).unwrap();
        t.insert_arena(2, 2).unwrap();
        assert_eq!(t.create_arena(3).unwrap(), 1);
        assert_eq!(t.create_arena(4).unwrap(), 3);
    }

    #[test]
    fn test_arena_limit() {
        let mut t = table(2, 4);
        t.create_arena(1).unwrap();
        t.create_arena(2).unwrap();
        let err = t.create_arena(3).unwrap_err();
        assert!(matches!(err, RegistryError::ArenaLimitExceeded { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_insert_occupied_slot() {
        let mut t = table(4, 4);
        t.insert_arena(1, 5).unwrap();
        assert!(matches!(
            t.insert_arena(1, 6),
            Err(RegistryError::ArenaSlotOccupied { index: 1 })
        ));
    }

    #[test]
    fn test_site_limit() {
        let mut t = table(4, 2);
        let idx = t.create_arena(1).unwrap();
        t.add_site(idx, 2).unwrap();
        let err = t.add_site(idx, 3).unwrap_err();
        assert!(matches!(err, RegistryError::SiteLimitExceeded { max_sites: 2, .. }));
        assert_eq!(t.get(idx).unwrap().sites(), &[1, 2]);
    }

    #[test]
    fn test_add_site_unknown_arena() {
        let mut t = table(4, 2);
        assert!(matches!(
            t.add_site(3, 1),
            Err(RegistryError::UnknownArena { index: 3 })
        ));
    }

    #[test]
    fn test_layout_applies_to_old_and_new_arenas() {
        let mut t = table(4, 2);
        let early = t.create_arena(1).unwrap();
        t.install_layout(|p| {
            p.events = Some(vec![Series::new(); 2]);
            p.alloc_size = Some(Series::new());
        });
        let late = t.create_arena(2).unwrap();
        for idx in [early, late] {
            let p = t.get(idx).unwrap();
            assert_eq!(p.events.as_ref().unwrap().len(), 2);
            assert!(p.alloc_size.is_some());
            assert!(p.resident.is_none());
        }
    }

    #[test]
    fn test_mid_run_arena_records_first_interval() {
        let mut t = table(4, 2);
        let sizes = ArenaSizes::new(4);
        t.install_layout(|p| p.alloc_size = Some(Series::new()));
        t.create_arena(1).unwrap();
        for p in t.iter_mut() {
            p.alloc_size.as_mut().unwrap().commit();
        }
        t.complete_interval(&sizes, Duration::ZERO);

        let idx = t.create_arena(2).unwrap();
        assert_eq!(t.get(idx).unwrap().first_interval(), 1);
        assert!(t.get(idx).unwrap().history_consistent(t.intervals_completed()));
    }

    #[test]
    fn test_complete_interval_snapshots() {
        let mut t = table(4, 2);
        let sizes = ArenaSizes::new(4);
        t.install_layout(|p| p.alloc_size = Some(Series::new()));
        let idx = t.create_arena(1).unwrap();
        sizes.set(idx, 300);
        t.get_mut(idx).unwrap().alloc_size.as_mut().unwrap().set_pending(300);
        t.get_mut(idx).unwrap().alloc_size.as_mut().unwrap().commit();

        let snap = t.complete_interval(&sizes, Duration::from_millis(1));
        assert_eq!(snap.index, 0);
        assert_eq!(snap.arena(idx).unwrap().alloc_bytes, Some(300));
        assert_eq!(t.intervals_completed(), 1);
        assert_eq!(t.snapshots().count(), 1);
        assert_eq!(t.take_snapshots().len(), 1);
        assert_eq!(t.snapshots().count(), 0);
    }
}
