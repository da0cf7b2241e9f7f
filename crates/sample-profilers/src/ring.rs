// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Consumer side of a perf sample ring.
//!
//! The kernel is the only producer and the profiler the only consumer, so
//! the ring needs no lock. Ordering comes from the two control words in
//! the metadata page:
//!
//! - `data_head` (offset 1024) is advanced by the kernel. We load it with
//!   `Acquire` so every record below it is visible.
//! - `data_tail` (offset 1032) is advanced by us. We store it with
//!   `Release` after we have finished reading, which hands the space back.
//!
//! # Layout
//!
//! ```text
//! ┌────────────────┬──────────────────────────────────────┐
//! │ metadata page  │ data area: 2^k pages, used circularly │
//! └────────────────┴──────────────────────────────────────┘
//!        head/tail are byte counters; position = counter % data_size
//! ```
//!
//! Only `PERF_RECORD_SAMPLE` records are counted. Other record types are
//! skipped by their header size, and a zero-sized header ends the walk.
//! Records that run past the end of the data area continue at its start.

use crate::ProfilerError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DATA_HEAD_OFFSET: usize = 1024;
pub const DATA_TAIL_OFFSET: usize = 1032;

/// `perf_event_header.type` of a sample record.
pub const PERF_RECORD_SAMPLE: u32 = 9;

const HEADER_SIZE: u64 = 8;

/// Size of a sample record with `sample_type = TID | ADDR`:
/// header, pid/tid, addr.
pub const SAMPLE_RECORD_SIZE: u16 = 24;

const ADDR_OFFSET: u64 = 16;

/// Memory backing a ring: one metadata page followed by the data area.
///
/// # Safety
/// `as_ptr` must return an 8-byte aligned pointer valid for reads and
/// writes of `len()` bytes for as long as `self` lives. The control words
/// may be written concurrently by one producer.
pub unsafe trait RingMemory: Send {
    fn as_ptr(&self) -> *mut u8;
    fn len(&self) -> usize;
}

// SAFETY: the mapping is page aligned and lives as long as the value.
unsafe impl RingMemory for memmap2::MmapRaw {
    fn as_ptr(&self) -> *mut u8 {
        self.as_mut_ptr()
    }

    fn len(&self) -> usize {
        memmap2::MmapRaw::len(self)
    }
}

// SAFETY: forwards to the boxed memory, which upholds the contract.
unsafe impl<M: RingMemory + ?Sized> RingMemory for Box<M> {
    fn as_ptr(&self) -> *mut u8 {
        (**self).as_ptr()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// Counts from one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Records of any type consumed.
    pub records: u64,
    /// Sample records with a non-null address.
    pub samples: u64,
    /// `false` if the head had not moved and nothing was read.
    pub advanced: bool,
}

/// A sample ring and the consumer's last observed head.
pub struct RingBuffer<M> {
    memory: M,
    page_size: usize,
    data_size: u64,
    last_head: u64,
}

impl<M: RingMemory> RingBuffer<M> {
    /// Wraps ring memory. The data area must be a power-of-two size.
    pub fn new(memory: M, page_size: usize) -> Result<Self, ProfilerError> {
        let len = memory.len();
        if page_size < DATA_TAIL_OFFSET + 8 || len <= page_size {
            return Err(ProfilerError::InvalidConfig(format!(
                "ring of {len} bytes cannot hold a {page_size}-byte metadata page and data"
            )));
        }
        let data_size = (len - page_size) as u64;
        if !data_size.is_power_of_two() {
            return Err(ProfilerError::InvalidConfig(format!(
                "ring data area of {data_size} bytes is not a power of two"
            )));
        }
        Ok(Self {
            memory,
            page_size,
            data_size,
            last_head: 0,
        })
    }

    fn control(&self, offset: usize) -> &AtomicU64 {
        // SAFETY: offset is inside the metadata page, which RingMemory
        // guarantees is valid and 8-byte aligned.
        unsafe { &*(self.memory.as_ptr().add(offset) as *const AtomicU64) }
    }

    fn data(&self) -> *const u8 {
        // SAFETY: page_size < len, checked in new().
        unsafe { self.memory.as_ptr().add(self.page_size) }
    }

    /// Copies `out.len()` bytes starting at counter `pos`, wrapping at the
    /// end of the data area.
    fn copy_out(&self, pos: u64, out: &mut [u8]) {
        let offset = (pos % self.data_size) as usize;
        let first = out.len().min(self.data_size as usize - offset);
        // SAFETY: both ranges lie within the data area.
        unsafe {
            std::ptr::copy_nonoverlapping(self.data().add(offset), out.as_mut_ptr(), first);
            if first < out.len() {
                std::ptr::copy_nonoverlapping(
                    self.data(),
                    out.as_mut_ptr().add(first),
                    out.len() - first,
                );
            }
        }
    }

    fn read_u64(&self, pos: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.copy_out(pos, &mut buf);
        u64::from_ne_bytes(buf)
    }

    /// Reads a `perf_event_header`: `(type, size)`.
    fn read_header(&self, pos: u64) -> (u32, u64) {
        let mut buf = [0u8; 8];
        self.copy_out(pos, &mut buf);
        let kind = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let size = u16::from_ne_bytes([buf[6], buf[7]]);
        (kind, size as u64)
    }

    /// Reads every complete record published since the last drain and
    /// calls `on_sample` with each sampled address.
    ///
    /// Draining twice without new data does nothing the second time.
    pub fn drain(&mut self, mut on_sample: impl FnMut(u64)) -> DrainStats {
        let head = self.control(DATA_HEAD_OFFSET).load(Ordering::Acquire);
        if head == self.last_head {
            return DrainStats::default();
        }

        let mut stats = DrainStats {
            advanced: true,
            ..DrainStats::default()
        };
        let mut tail = self.control(DATA_TAIL_OFFSET).load(Ordering::Relaxed);
        while head.wrapping_sub(tail) >= HEADER_SIZE {
            let (kind, size) = self.read_header(tail);
            if size == 0 || head.wrapping_sub(tail) < size {
                break;
            }
            stats.records += 1;
            if kind == PERF_RECORD_SAMPLE && size >= SAMPLE_RECORD_SIZE as u64 {
                let addr = self.read_u64(tail + ADDR_OFFSET);
                if addr != 0 {
                    stats.samples += 1;
                    on_sample(addr);
                }
            }
            tail = tail.wrapping_add(size);
        }

        self.control(DATA_TAIL_OFFSET).store(head, Ordering::Release);
        self.last_head = head;
        stats
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }
}

struct RingStorage {
    words: Box<[AtomicU64]>,
}

/// A heap-backed ring with the kernel's layout, for replaying samples.
pub struct InMemoryRing {
    storage: Arc<RingStorage>,
}

impl InMemoryRing {
    /// Allocates a metadata page plus `data_pages` pages (a power of two).
    pub fn new(page_size: usize, data_pages: usize) -> Self {
        let words = (page_size * (1 + data_pages)) / 8;
        Self {
            storage: Arc::new(RingStorage {
                words: (0..words).map(|_| AtomicU64::new(0)).collect(),
            }),
        }
    }

    /// Returns the producer handle.
    pub fn writer(&self, page_size: usize) -> RingWriter {
        let data_size = (self.storage.words.len() * 8 - page_size) as u64;
        RingWriter {
            storage: Arc::clone(&self.storage),
            page_size,
            data_size,
            head: 0,
        }
    }
}

// SAFETY: the storage is an aligned, heap-allocated slice of AtomicU64,
// kept alive by the Arc for the lifetime of self.
unsafe impl RingMemory for InMemoryRing {
    fn as_ptr(&self) -> *mut u8 {
        self.storage.words.as_ptr() as *mut u8
    }

    fn len(&self) -> usize {
        self.storage.words.len() * 8
    }
}

/// Producer side of an [`InMemoryRing`], standing in for the kernel.
pub struct RingWriter {
    storage: Arc<RingStorage>,
    page_size: usize,
    data_size: u64,
    head: u64,
}

impl RingWriter {
    fn word(&self, offset: usize) -> &AtomicU64 {
        &self.storage.words[offset / 8]
    }

    fn write_bytes(&self, pos: u64, bytes: &[u8]) {
        let base = self.storage.words.as_ptr() as *mut u8;
        for (i, b) in bytes.iter().enumerate() {
            let offset = self.page_size + ((pos + i as u64) % self.data_size) as usize;
            // SAFETY: offset is inside the data area of the storage.
            unsafe { base.add(offset).write_volatile(*b) };
        }
    }

    /// Appends a raw record. Returns `false` (record lost) if the consumer
    /// has not freed enough space.
    pub fn write_record(&mut self, kind: u32, payload: &[u8]) -> bool {
        let size = HEADER_SIZE + payload.len() as u64;
        let tail = self.word(DATA_TAIL_OFFSET).load(Ordering::Acquire);
        if self.head - tail + size > self.data_size {
            return false;
        }
        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&kind.to_ne_bytes());
        header[6..].copy_from_slice(&(size as u16).to_ne_bytes());
        self.write_bytes(self.head, &header);
        self.write_bytes(self.head + HEADER_SIZE, payload);
        self.head += size;
        true
    }

    /// Appends a `TID | ADDR` sample record.
    pub fn write_sample(&mut self, tid: u32, addr: u64) -> bool {
        let mut payload = [0u8; 16];
        payload[..4].copy_from_slice(&tid.to_ne_bytes());
        payload[4..8].copy_from_slice(&tid.to_ne_bytes());
        payload[8..].copy_from_slice(&addr.to_ne_bytes());
        self.write_record(PERF_RECORD_SAMPLE, &payload)
    }

    /// Makes everything written so far visible to the consumer.
    pub fn publish(&self) {
        self.word(DATA_HEAD_OFFSET).store(self.head, Ordering::Release);
    }

    /// Bytes written but not yet consumed.
    pub fn pending_bytes(&self) -> u64 {
        self.head - self.word(DATA_TAIL_OFFSET).load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 4096;

    fn ring(data_pages: usize) -> (RingBuffer<InMemoryRing>, RingWriter) {
        let mem = InMemoryRing::new(PAGE, data_pages);
        let writer = mem.writer(PAGE);
        (RingBuffer::new(mem, PAGE).unwrap(), writer)
    }

    fn collect(rb: &mut RingBuffer<InMemoryRing>) -> (Vec<u64>, DrainStats) {
        let mut addrs = Vec::new();
        let stats = rb.drain(|a| addrs.push(a));
        (addrs, stats)
    }

    #[test]
    fn test_drain_reads_published_samples() {
        let (mut rb, mut w) = ring(1);
        w.write_sample(1, 0x1000);
        w.write_sample(1, 0x2000);
        w.publish();
        let (addrs, stats) = collect(&mut rb);
        assert_eq!(addrs, vec![0x1000, 0x2000]);
        assert_eq!(stats.samples, 2);
        assert_eq!(w.pending_bytes(), 0);
    }

    #[test]
    fn test_unpublished_records_are_invisible() {
        let (mut rb, mut w) = ring(1);
        w.write_sample(1, 0x1000);
        let (addrs, stats) = collect(&mut rb);
        assert!(addrs.is_empty());
        assert!(!stats.advanced);
    }

    #[test]
    fn test_duplicate_drain_is_idempotent() {
        let (mut rb, mut w) = ring(1);
        w.write_sample(1, 0xabc0);
        w.publish();
        assert_eq!(collect(&mut rb).0.len(), 1);
        // A second notification with an unchanged head reads nothing.
        let (addrs, stats) = collect(&mut rb);
        assert!(addrs.is_empty());
        assert!(!stats.advanced);
    }

    #[test]
    fn test_non_sample_records_skipped_by_size() {
        let (mut rb, mut w) = ring(1);
        w.write_record(1, &[0u8; 40]); // PERF_RECORD_MMAP
        w.write_sample(1, 0x5000);
        w.write_record(3, &[0u8; 12]); // PERF_RECORD_COMM
        w.publish();
        let (addrs, stats) = collect(&mut rb);
        assert_eq!(addrs, vec![0x5000]);
        assert_eq!(stats.records, 3);
    }

    #[test]
    fn test_null_address_not_counted() {
        let (mut rb, mut w) = ring(1);
        w.write_sample(1, 0);
        w.publish();
        let (addrs, stats) = collect(&mut rb);
        assert!(addrs.is_empty());
        assert_eq!(stats.records, 1);
        assert_eq!(stats.samples, 0);
    }

    #[test]
    fn test_records_wrap_around_data_end() {
        let (mut rb, mut w) = ring(1);
        // 4096 / 24 leaves a record straddling the end of the data area.
        let mut expected = Vec::new();
        for round in 0..3u64 {
            for i in 0..100u64 {
                let addr = 0x10_0000 + round * 0x1000 + i * 8;
                assert!(w.write_sample(1, addr));
                expected.push(addr);
            }
            w.publish();
            let (addrs, _) = collect(&mut rb);
            assert_eq!(addrs, expected);
            expected.clear();
        }
    }

    #[test]
    fn test_writer_drops_records_when_full() {
        let (_rb, mut w) = ring(1);
        let fits = 4096 / SAMPLE_RECORD_SIZE as usize;
        for i in 0..fits {
            assert!(w.write_sample(1, 0x1000 + i as u64));
        }
        assert!(!w.write_sample(1, 0x9999));
    }

    #[test]
    fn test_rejects_non_power_of_two_data() {
        let mem = InMemoryRing::new(PAGE, 3);
        assert!(RingBuffer::new(mem, PAGE).is_err());
    }
}
