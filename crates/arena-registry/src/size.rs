// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Human-readable byte sizes.
//!
//! A [`ByteSize`] is used for tier capacities and for option values such as
//! `upper_capacity = "512M"`.

use crate::RegistryError;
use std::fmt;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = MIB * 1024;

/// A byte count with human-readable parsing and display.
///
/// # Parsing
/// - `"512M"` or `"512MB"` → 512 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1 × 1024³ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
///
/// # Examples
/// ```
/// use arena_registry::ByteSize;
///
/// let b = ByteSize::parse("1G").unwrap();
/// assert_eq!(b.as_mb(), 1024);
/// assert_eq!(ByteSize::from_mb(3).as_bytes(), 3 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ByteSize {
    bytes: u64,
}

impl ByteSize {
    /// Creates a size from a byte count.
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Creates a size from megabytes.
    pub fn from_mb(mb: u64) -> Self {
        Self {
            bytes: mb.saturating_mul(MIB),
        }
    }

    /// Creates a size from gigabytes.
    pub fn from_gb(gb: u64) -> Self {
        Self {
            bytes: gb.saturating_mul(GIB),
        }
    }

    /// Returns the size in bytes.
    pub fn as_bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the size in megabytes (truncated).
    pub fn as_mb(&self) -> u64 {
        self.bytes / (1024 * 1024)
    }

    /// Parses a human-readable size string. Case-insensitive; zero is allowed
    /// (a zero-capacity upper tier disables promotion).
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        let s = s.trim();
        let invalid = |detail: &str| RegistryError::InvalidByteSize {
            input: s.to_string(),
            detail: detail.to_string(),
        };
        if s.is_empty() {
            return Err(invalid("empty string"));
        }

        let upper = s.to_uppercase();
        let (num_str, multiplier): (&str, u64) = if upper.ends_with("GB") {
            (&s[..s.len() - 2], 1024 * 1024 * 1024)
        } else if upper.ends_with('G') {
            (&s[..s.len() - 1], 1024 * 1024 * 1024)
        } else if upper.ends_with("MB") {
            (&s[..s.len() - 2], 1024 * 1024)
        } else if upper.ends_with('M') {
            (&s[..s.len() - 1], 1024 * 1024)
        } else if upper.ends_with("KB") {
            (&s[..s.len() - 2], 1024)
        } else if upper.ends_with('K') {
            (&s[..s.len() - 1], 1024)
        } else if upper.ends_with('B') {
            (&s[..s.len() - 1], 1)
        } else {
            (s, 1)
        };

        let value: u64 = num_str
            .trim()
            .parse()
            .map_err(|_| invalid("expected a number followed by an optional suffix (K, M, G)"))?;
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("value overflows u64"))?;

        Ok(Self { bytes })
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;
        if self.bytes >= GB && self.bytes % GB == 0 {
            write!(f, "{} GB", self.bytes / GB)
        } else if self.bytes >= MB && self.bytes % MB == 0 {
            write!(f, "{} MB", self.bytes / MB)
        } else if self.bytes >= KB && self.bytes % KB == 0 {
            write!(f, "{} KB", self.bytes / KB)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}

impl TryFrom<String> for ByteSize {
    type Error = RegistryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ByteSize> for String {
    fn from(b: ByteSize) -> String {
        b.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(ByteSize::parse("512M").unwrap().as_mb(), 512);
        assert_eq!(ByteSize::parse("512mb").unwrap().as_mb(), 512);
        assert_eq!(ByteSize::parse("2g").unwrap().as_mb(), 2048);
        assert_eq!(ByteSize::parse("4K").unwrap().as_bytes(), 4096);
        assert_eq!(ByteSize::parse("100B").unwrap().as_bytes(), 100);
        assert_eq!(ByteSize::parse("  1048576 ").unwrap().as_mb(), 1);
    }

    #[test]
    fn test_parse_zero_is_allowed() {
        assert_eq!(ByteSize::parse("0").unwrap().as_bytes(), 0);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ByteSize::parse("").is_err());
        assert!(ByteSize::parse("abc").is_err());
        assert!(ByteSize::parse("99999999999999999999G").is_err());
    }

    #[test]
    fn test_constructors_saturate() {
        assert_eq!(ByteSize::from_mb(3).as_bytes(), 3 * 1024 * 1024);
        assert_eq!(ByteSize::from_gb(2).as_mb(), 2048);
        assert_eq!(ByteSize::from_mb(u64::MAX).as_bytes(), u64::MAX);
        assert_eq!(ByteSize::from_gb(u64::MAX / 1024).as_bytes(), u64::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(ByteSize::from_gb(1).to_string(), "1 GB");
        assert_eq!(ByteSize::from_mb(512).to_string(), "512 MB");
        assert_eq!(ByteSize::from_bytes(2048).to_string(), "2 KB");
        assert_eq!(ByteSize::from_bytes(200).to_string(), "200 B");
    }

    #[test]
    fn test_serde_roundtrip() {
        let b = ByteSize::from_mb(256);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "\"256 MB\"");
        let back: ByteSize = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
        let parsed: ByteSize = serde_json::from_str("\"1G\"").unwrap();
        assert_eq!(parsed, ByteSize::from_gb(1));
        assert!(serde_json::from_str::<ByteSize>("\"lots\"").is_err());
    }
}
