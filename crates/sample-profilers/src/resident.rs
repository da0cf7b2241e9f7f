// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Resident-set profiler via `/proc/self/pagemap`.
//!
//! The pagemap holds one 64-bit entry per virtual page; bit 63 is set when
//! the page is present in RAM. For every extent we read the entries that
//! cover it and split its span into resident and non-resident bytes.

use crate::{Profiler, ProfilerError, ProfilerKind, SampleContext};
use arena_registry::{ArenaProfile, ResidentRecord};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

const PAGEMAP_PATH: &str = "/proc/self/pagemap";
const PRESENT_BIT: u64 = 1 << 63;
const ENTRY_SIZE: u64 = 8;

/// Entries read per `pread`.
const CHUNK_ENTRIES: usize = 512;

/// Options for the resident-set profiler.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResidentConfig {
    pub skip_intervals: u32,
    pub pagemap_path: PathBuf,
}

impl Default for ResidentConfig {
    fn default() -> Self {
        Self {
            skip_intervals: 1,
            pagemap_path: PathBuf::from(PAGEMAP_PATH),
        }
    }
}

pub struct ResidentSetProfiler {
    config: ResidentConfig,
    page_size: usize,
    pagemap: Option<File>,
    buf: Vec<u8>,
}

impl ResidentSetProfiler {
    pub fn new(config: ResidentConfig) -> Self {
        Self::with_page_size(config, crate::perf::page_size())
    }

    pub fn with_page_size(config: ResidentConfig, page_size: usize) -> Self {
        Self {
            config,
            page_size,
            pagemap: None,
            buf: vec![0u8; CHUNK_ENTRIES * ENTRY_SIZE as usize],
        }
    }

    /// Counts present pages in `[start, end)`.
    fn present_pages(&mut self, start: usize, end: usize) -> Result<u64, ProfilerError> {
        let Some(file) = self.pagemap.as_ref() else {
            return Ok(0);
        };
        let first = (start / self.page_size) as u64;
        let last = ((end - 1) / self.page_size) as u64;
        let mut present = 0;
        let mut page = first;
        while page <= last {
            let n = ((last - page + 1) as usize).min(CHUNK_ENTRIES);
            let bytes = &mut self.buf[..n * ENTRY_SIZE as usize];
            let read = file
                .read_at(bytes, page * ENTRY_SIZE)
                .map_err(|source| ProfilerError::Io {
                    path: self.config.pagemap_path.display().to_string(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            present += bytes[..read - read % ENTRY_SIZE as usize]
                .chunks_exact(ENTRY_SIZE as usize)
                .map(|c| u64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .filter(|entry| entry & PRESENT_BIT != 0)
                .count() as u64;
            page += (read / ENTRY_SIZE as usize) as u64;
        }
        Ok(present)
    }
}

impl Profiler for ResidentSetProfiler {
    fn kind(&self) -> ProfilerKind {
        ProfilerKind::ResidentSet
    }

    fn skip_ratio(&self) -> u32 {
        self.config.skip_intervals
    }

    fn init(&mut self) -> Result<(), ProfilerError> {
        let path = &self.config.pagemap_path;
        let file = File::open(path).map_err(|source| ProfilerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.pagemap = Some(file);
        tracing::info!("resident-set profiler reading {}", path.display());
        Ok(())
    }

    fn deinit(&mut self) {
        self.pagemap = None;
    }

    fn run(&mut self, ctx: &mut SampleContext<'_>) -> Result<(), ProfilerError> {
        let extents: Vec<_> = ctx.extents.read()?.iter().copied().collect();
        for extent in extents {
            let Some(record) = ctx
                .table
                .get_mut(extent.arena)
                .and_then(|p| p.resident.as_mut())
            else {
                continue;
            };
            let span = extent.len() as u64;
            let resident = (self.present_pages(extent.start, extent.end)? * self.page_size as u64).min(span);
            record.resident.accumulate(resident);
            record.non_resident.accumulate(span - resident);
        }
        Ok(())
    }

    fn on_interval(&self, arena: &mut ArenaProfile) {
        if let Some(r) = arena.resident.as_mut() {
            r.resident.commit();
            r.non_resident.commit();
        }
    }

    fn on_skip_interval(&self, arena: &mut ArenaProfile) {
        if let Some(r) = arena.resident.as_mut() {
            r.resident.carry_forward();
            r.non_resident.carry_forward();
        }
    }

    fn on_arena_created(&self, arena: &mut ArenaProfile) {
        arena.resident = Some(ResidentRecord::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_registry::{ArenaRegistry, RegistryLimits};
    use std::io::Write;

    const PAGE: usize = 4096;

    /// Writes a fake pagemap where the listed pages are present.
    fn write_pagemap(name: &str, pages: usize, present: &[usize]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tierprof_pagemap_{name}_{}", std::process::id()));
        let mut f = File::create(&path).unwrap();
        for page in 0..pages {
            let entry: u64 = if present.contains(&page) { PRESENT_BIT | page as u64 } else { 0 };
            f.write_all(&entry.to_ne_bytes()).unwrap();
        }
        path
    }

    fn profiler(path: PathBuf) -> ResidentSetProfiler {
        let mut p = ResidentSetProfiler::with_page_size(
            ResidentConfig {
                skip_intervals: 1,
                pagemap_path: path,
            },
            PAGE,
        );
        p.init().unwrap();
        p
    }

    #[test]
    fn test_splits_resident_and_non_resident() {
        let path = write_pagemap("split", 64, &[16, 17, 40]);
        let mut p = profiler(path.clone());

        let r = ArenaRegistry::new(RegistryLimits::default()).unwrap();
        r.install_layout(|a| p.on_arena_created(a)).unwrap();
        let a = r.create_arena(1).unwrap();
        let b = r.create_arena(2).unwrap();
        // Arena a: pages 16..20 (two present). Arena b: pages 40..42 and 50..51.
        r.register_extent(a, 16 * PAGE, 20 * PAGE).unwrap();
        r.register_extent(b, 40 * PAGE, 42 * PAGE).unwrap();
        r.register_extent(b, 50 * PAGE, 51 * PAGE).unwrap();

        let mut table = r.lock_profiles().unwrap();
        let mut ctx = SampleContext {
            table: &mut table,
            extents: r.extents(),
            sizes: r.sizes(),
        };
        p.run(&mut ctx).unwrap();
        for arena in table.iter_mut() {
            p.on_interval(arena);
        }

        let ra = table.get(a).unwrap().resident.as_ref().unwrap();
        assert_eq!(ra.resident.values(), &[2 * PAGE as u64]);
        assert_eq!(ra.non_resident.values(), &[2 * PAGE as u64]);
        let rb = table.get(b).unwrap().resident.as_ref().unwrap();
        assert_eq!(rb.resident.values(), &[PAGE as u64]);
        assert_eq!(rb.non_resident.values(), &[2 * PAGE as u64]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_extent_past_end_of_pagemap() {
        let path = write_pagemap("short", 4, &[2, 3]);
        let mut p = profiler(path.clone());
        assert_eq!(p.present_pages(2 * PAGE, 10 * PAGE).unwrap(), 2);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_init_missing_file_fails() {
        let mut p = ResidentSetProfiler::with_page_size(
            ResidentConfig {
                skip_intervals: 1,
                pagemap_path: PathBuf::from("/nonexistent/pagemap"),
            },
            PAGE,
        );
        assert!(matches!(p.init(), Err(ProfilerError::Io { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_own_stack_page_is_resident() {
        let mut p = ResidentSetProfiler::new(ResidentConfig::default());
        p.init().unwrap();
        let local = [1u8; 64];
        let addr = local.as_ptr() as usize;
        let page = crate::perf::page_size();
        let start = addr - addr % page;
        assert_eq!(p.present_pages(start, start + page).unwrap(), 1);
    }
}
