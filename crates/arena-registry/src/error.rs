// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the arena registry.

/// Errors raised by arena, site and extent bookkeeping.
///
/// Capacity violations (`ArenaLimitExceeded`, `SiteLimitExceeded`,
/// `ArenaSlotOccupied`, `UnknownArena`) indicate a misconfigured run and are
/// treated as fatal by the runtime. Extent errors are recoverable.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The arena index is outside `0..max_arenas`.
    #[error("arena index {index} exceeds the configured maximum of {max_arenas} arenas")]
    ArenaLimitExceeded { index: usize, max_arenas: usize },

    /// An arena already exists at this index.
    #[error("arena index {index} is already in use")]
    ArenaSlotOccupied { index: usize },

    /// No arena has been created at this index.
    #[error("no arena exists at index {index}")]
    UnknownArena { index: usize },

    /// Adding another site would exceed the per-arena site limit.
    #[error("arena {index} already holds the maximum of {max_sites} allocation sites")]
    SiteLimitExceeded { index: usize, max_sites: usize },

    /// The extent range is empty or inverted.
    #[error("invalid extent range [{start:#x}, {end:#x})")]
    InvalidExtent { start: usize, end: usize },

    /// The profile lock was poisoned by a panicking holder.
    #[error("profile lock poisoned")]
    LockPoisoned,

    /// A configured limit is zero.
    #[error("invalid registry limits: {0}")]
    InvalidLimits(String),

    /// A human-readable byte size could not be parsed.
    #[error("invalid byte size '{input}': {detail}")]
    InvalidByteSize { input: String, detail: String },
}

impl RegistryError {
    /// Returns `true` for errors that indicate a misconfigured run rather
    /// than a transient condition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RegistryError::ArenaLimitExceeded { .. }
                | RegistryError::ArenaSlotOccupied { .. }
                | RegistryError::UnknownArena { .. }
                | RegistryError::SiteLimitExceeded { .. }
                | RegistryError::InvalidLimits(_)
        )
    }
}
