// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Profiling options loaded from TOML files or constructed programmatically.
//!
//! A profiler is enabled by the presence of its section. Every field has a
//! default, so an empty file is a valid configuration.
//!
//! # TOML Format
//! ```toml
//! period_ns = 100000000
//! too_soon_ratio = 0.9
//!
//! [limits]
//! max_arenas = 4096
//! max_sites_per_arena = 256
//!
//! [hardware]
//! events = ["page-faults", "r01d3"]
//! sample_period = 8
//!
//! [resident]
//! skip_intervals = 4
//!
//! [alloc_size]
//!
//! [tiering]
//! strategy = "threshold"
//! upper_capacity_limit = "512M"
//! ```

use crate::RuntimeError;
use arena_registry::RegistryLimits;
use sample_profilers::{
    AllocSizeConfig, AllocSizeProfiler, ExtentSizeConfig, ExtentSizeProfiler, HardwareConfig,
    HardwareProfiler, Profiler, ResidentConfig, ResidentSetProfiler,
};
use std::path::Path;
use std::time::Duration;
use tiering_engine::TieringConfig;

/// Immutable options for one profiling session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProfilingOptions {
    /// Target interval length in nanoseconds.
    pub period_ns: u64,
    /// A tick arriving sooner than this share of the period after the
    /// previous interval completed is dropped.
    pub too_soon_ratio: f64,
    pub limits: RegistryLimits,
    pub hardware: Option<HardwareConfig>,
    pub resident: Option<ResidentConfig>,
    pub extent_size: Option<ExtentSizeConfig>,
    pub alloc_size: Option<AllocSizeConfig>,
    pub tiering: Option<TieringConfig>,
}

impl Default for ProfilingOptions {
    fn default() -> Self {
        Self {
            period_ns: 100_000_000,
            too_soon_ratio: 0.9,
            limits: RegistryLimits::default(),
            hardware: None,
            resident: None,
            extent_size: Some(ExtentSizeConfig::default()),
            alloc_size: Some(AllocSizeConfig::default()),
            tiering: None,
        }
    }
}

impl ProfilingOptions {
    /// Loads options from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates options from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, RuntimeError> {
        let options: Self = toml::from_str(toml_str)
            .map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Serialises options to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.period_ns == 0 {
            return Err(RuntimeError::Config("period_ns must be non-zero".into()));
        }
        if !(self.too_soon_ratio > 0.0 && self.too_soon_ratio <= 1.0) {
            return Err(RuntimeError::Config(format!(
                "too_soon_ratio {} is outside (0, 1]",
                self.too_soon_ratio
            )));
        }
        self.limits.validate()?;
        if let Some(hw) = &self.hardware {
            hw.validate()?;
        }
        if let Some(tiering) = &self.tiering {
            tiering.validate()?;
            if let Some(hw) = &self.hardware {
                if tiering.event_index >= hw.events.len() {
                    return Err(RuntimeError::Config(format!(
                        "tiering.event_index {} but only {} hardware events configured",
                        tiering.event_index,
                        hw.events.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Creates one profiler per enabled section.
    pub fn build_profilers(&self) -> Result<Vec<Box<dyn Profiler>>, RuntimeError> {
        let mut profilers: Vec<Box<dyn Profiler>> = Vec::new();
        if let Some(hw) = &self.hardware {
            profilers.push(Box::new(HardwareProfiler::new(hw.clone())?));
        }
        if let Some(rss) = &self.resident {
            profilers.push(Box::new(ResidentSetProfiler::new(rss.clone())));
        }
        if let Some(extents) = &self.extent_size {
            profilers.push(Box::new(ExtentSizeProfiler::new(extents.clone())));
        }
        if let Some(allocs) = &self.alloc_size {
            profilers.push(Box::new(AllocSizeProfiler::new(allocs.clone())));
        }
        Ok(profilers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sample_profilers::ProfilerKind;

    #[test]
    fn test_default() {
        let o = ProfilingOptions::default();
        assert_eq!(o.period(), Duration::from_millis(100));
        assert_eq!(o.too_soon_ratio, 0.9);
        assert!(o.hardware.is_none());
        assert!(o.tiering.is_none());
        o.validate().unwrap();
    }

    #[test]
    fn test_empty_toml_is_default() {
        let o = ProfilingOptions::from_toml_str("").unwrap();
        assert_eq!(o, ProfilingOptions::default());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
period_ns = 5000000

[limits]
max_arenas = 64

[hardware]
events = ["page-faults", "r01d3"]
cpus = [0, 1]

[resident]
skip_intervals = 4

[tiering]
strategy = "ski"
window = 3
event_index = 1
upper_capacity_limit = "512M"
"#;
        let o = ProfilingOptions::from_toml_str(toml).unwrap();
        assert_eq!(o.period(), Duration::from_millis(5));
        assert_eq!(o.limits.max_arenas, 64);
        assert_eq!(o.limits.max_sites_per_arena, 256);
        let hw = o.hardware.as_ref().unwrap();
        assert_eq!(hw.events.len(), 2);
        assert!(hw.events[1].is_raw());
        assert_eq!(hw.cpus, vec![0, 1]);
        assert_eq!(o.resident.as_ref().unwrap().skip_intervals, 4);
        let t = o.tiering.as_ref().unwrap();
        assert_eq!(t.strategy, "ski");
        assert_eq!(t.upper_capacity_limit.unwrap().as_mb(), 512);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let o = ProfilingOptions {
            tiering: Some(TieringConfig::default()),
            hardware: Some(HardwareConfig::default()),
            ..Default::default()
        };
        let text = o.to_toml().unwrap();
        let back = ProfilingOptions::from_toml_str(&text).unwrap();
        assert_eq!(back, o);
    }

    #[test]
    fn test_invalid_options() {
        assert!(ProfilingOptions::from_toml_str("period_ns = 0").is_err());
        assert!(ProfilingOptions::from_toml_str("too_soon_ratio = 1.5").is_err());
        assert!(ProfilingOptions::from_toml_str("[limits]\nmax_arenas = 0").is_err());
        assert!(ProfilingOptions::from_toml_str("[tiering]\nwindow = 0").is_err());
        assert!(ProfilingOptions::from_toml_str("[hardware]\nevents = [\"bogus\"]").is_err());
        let missing_event = "[hardware]\n[tiering]\nevent_index = 2";
        assert!(matches!(
            ProfilingOptions::from_toml_str(missing_event),
            Err(RuntimeError::Config(_))
        ));
    }

    #[test]
    fn test_build_profilers_follows_sections() {
        let o = ProfilingOptions {
            resident: Some(ResidentConfig::default()),
            ..Default::default()
        };
        let kinds: Vec<ProfilerKind> = o.build_profilers().unwrap().iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            vec![ProfilerKind::ResidentSet, ProfilerKind::ExtentSize, ProfilerKind::AllocSize]
        );
    }
}
