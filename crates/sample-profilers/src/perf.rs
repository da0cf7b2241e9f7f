// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Perf event descriptions and the `perf_event_open` plumbing.
//!
//! Events are named the way `perf list` names them (`cycles`,
//! `page-faults`, ...) or given as raw PMU codes (`r01cd`). Each event is
//! opened once per monitored CPU with `sample_type = TID | ADDR`, user
//! space only, and its sample ring is mapped read-write so the consumer
//! can advance `data_tail`.

use crate::ProfilerError;
use std::fmt;
use std::str::FromStr;

const PERF_TYPE_HARDWARE: u32 = 0;
const PERF_TYPE_SOFTWARE: u32 = 1;
const PERF_TYPE_RAW: u32 = 4;

const PERF_SAMPLE_TID: u64 = 1 << 1;
const PERF_SAMPLE_ADDR: u64 = 1 << 3;

/// A perf event: attribute type plus config word.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventSpec {
    name: String,
    type_: u32,
    config: u64,
}

const NAMED_EVENTS: &[(&str, u32, u64)] = &[
    ("cycles", PERF_TYPE_HARDWARE, 0),
    ("cpu-cycles", PERF_TYPE_HARDWARE, 0),
    ("instructions", PERF_TYPE_HARDWARE, 1),
    ("cache-references", PERF_TYPE_HARDWARE, 2),
    ("cache-misses", PERF_TYPE_HARDWARE, 3),
    ("branch-instructions", PERF_TYPE_HARDWARE, 4),
    ("branch-misses", PERF_TYPE_HARDWARE, 5),
    ("cpu-clock", PERF_TYPE_SOFTWARE, 0),
    ("task-clock", PERF_TYPE_SOFTWARE, 1),
    ("page-faults", PERF_TYPE_SOFTWARE, 2),
    ("faults", PERF_TYPE_SOFTWARE, 2),
    ("minor-faults", PERF_TYPE_SOFTWARE, 5),
    ("major-faults", PERF_TYPE_SOFTWARE, 6),
];

impl EventSpec {
    pub fn parse(s: &str) -> Result<Self, ProfilerError> {
        let name = s.trim();
        if let Some(&(_, type_, config)) = NAMED_EVENTS.iter().find(|(n, _, _)| *n == name) {
            return Ok(Self {
                name: name.to_string(),
                type_,
                config,
            });
        }
        if let Some(hex) = name.strip_prefix('r') {
            if !hex.is_empty() {
                if let Ok(config) = u64::from_str_radix(hex, 16) {
                    return Ok(Self {
                        name: name.to_string(),
                        type_: PERF_TYPE_RAW,
                        config,
                    });
                }
            }
        }
        Err(ProfilerError::InvalidEvent(s.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_raw(&self) -> bool {
        self.type_ == PERF_TYPE_RAW
    }
}

impl Default for EventSpec {
    /// `page-faults`: available without PMU access and carries a data
    /// address with every sample.
    fn default() -> Self {
        Self {
            name: "page-faults".to_string(),
            type_: PERF_TYPE_SOFTWARE,
            config: 2,
        }
    }
}

impl FromStr for EventSpec {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventSpec {
    type Error = ProfilerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<EventSpec> for String {
    fn from(e: EventSpec) -> Self {
        e.name
    }
}

impl fmt::Display for EventSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// `struct perf_event_attr`, `PERF_ATTR_SIZE_VER5` layout.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PerfEventAttr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub reserved_2: u16,
}

// Bit positions in perf_event_attr's flag word.
const FLAG_DISABLED: u64 = 1 << 0;
const FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
const FLAG_EXCLUDE_HV: u64 = 1 << 6;
const FLAG_MMAP: u64 = 1 << 8;
const FLAG_TASK: u64 = 1 << 13;
const PRECISE_IP_SHIFT: u64 = 15;

impl PerfEventAttr {
    /// Builds a disabled, user-only sampling attribute for `event`.
    pub(crate) fn sampling(event: &EventSpec, sample_period: u64, precise_ip: u8) -> Self {
        Self {
            type_: event.type_,
            size: std::mem::size_of::<Self>() as u32,
            config: event.config,
            sample_period,
            sample_type: PERF_SAMPLE_TID | PERF_SAMPLE_ADDR,
            flags: FLAG_DISABLED
                | FLAG_EXCLUDE_KERNEL
                | FLAG_EXCLUDE_HV
                | FLAG_MMAP
                | FLAG_TASK
                | ((precise_ip.min(3) as u64) << PRECISE_IP_SHIFT),
            ..Self::default()
        }
    }

    pub(crate) fn precise_ip(&self) -> u8 {
        ((self.flags >> PRECISE_IP_SHIFT) & 0b11) as u8
    }
}

/// Size of one system page, from `sysconf`.
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}

/// Number of online CPUs, from `sysconf`.
pub fn online_cpus() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n > 0 {
            return n as usize;
        }
    }
    1
}

#[cfg(target_os = "linux")]
pub(crate) mod sys {
    use super::PerfEventAttr;
    use crate::ProfilerError;
    use std::fs::File;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    const PERF_EVENT_IOC_ENABLE: u64 = 0x2400;
    const PERF_EVENT_IOC_DISABLE: u64 = 0x2401;
    const PERF_EVENT_IOC_RESET: u64 = 0x2403;
    const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

    /// An open perf event and its mapped sample ring.
    pub(crate) struct PerfEvent {
        pub file: File,
        pub ring: memmap2::MmapRaw,
    }

    /// Opens `attr` and maps `1 + data_pages` pages of sample ring.
    ///
    /// `cpu == -1` follows this process on any CPU; otherwise every
    /// process on that CPU is monitored.
    pub(crate) fn open(
        attr: &PerfEventAttr,
        name: &str,
        cpu: i32,
        page_size: usize,
        data_pages: usize,
    ) -> Result<PerfEvent, ProfilerError> {
        let pid: libc::pid_t = if cpu == -1 { 0 } else { -1 };
        // SAFETY: attr is a valid, fully initialized perf_event_attr whose
        // size field matches its layout.
        let fd = unsafe {
            libc::syscall(
                libc::SYS_perf_event_open,
                attr as *const PerfEventAttr,
                pid,
                cpu,
                -1 as libc::c_int,
                PERF_FLAG_FD_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(ProfilerError::PerfOpen {
                event: name.to_string(),
                cpu,
                source: std::io::Error::last_os_error(),
            });
        }
        // SAFETY: fd was just returned by the kernel and is owned by nobody else.
        let file = File::from(unsafe { OwnedFd::from_raw_fd(fd as libc::c_int) });

        let ring = memmap2::MmapOptions::new()
            .len(page_size * (1 + data_pages))
            .map_raw(&file)
            .map_err(|source| ProfilerError::Mmap {
                event: name.to_string(),
                source,
            })?;

        Ok(PerfEvent { file, ring })
    }

    fn ioctl(file: &File, request: u64) -> std::io::Result<()> {
        // SAFETY: perf ioctls without an argument on a valid perf fd.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, 0) };
        if rc < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub(crate) fn enable(file: &File) -> std::io::Result<()> {
        ioctl(file, PERF_EVENT_IOC_RESET)?;
        ioctl(file, PERF_EVENT_IOC_ENABLE)
    }

    pub(crate) fn disable(file: &File) -> std::io::Result<()> {
        ioctl(file, PERF_EVENT_IOC_DISABLE)
    }
}
