// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the tiering engine.

use crate::DeviceId;

/// Errors raised while configuring the tiering engine.
#[derive(Debug, thiserror::Error)]
pub enum TieringError {
    /// None of the configured upper-tier nodes matched a device.
    #[error("no device found for upper-tier nodes {0:?}")]
    NoUpperDevices(Vec<i32>),

    /// None of the configured lower-tier nodes matched a device.
    #[error("no device found for lower-tier nodes {0:?}")]
    NoLowerDevices(Vec<i32>),

    /// A node was listed for both tiers.
    #[error("node {0} is configured as both upper and lower tier")]
    OverlappingTiers(i32),

    /// The strategy name is not recognised.
    #[error("unknown classification strategy '{0}' (expected 'threshold' or 'penalty')")]
    UnknownStrategy(String),

    /// A tiering option is out of range.
    #[error("invalid tiering configuration: {0}")]
    InvalidConfig(String),
}

/// A single arena move that did not happen.
///
/// Rebind errors never abort a batch; they are logged and counted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RebindError {
    /// The device layer refused the move by policy (e.g. it would
    /// overflow the target device).
    #[error("rebinding arena {arena} rejected: {reason}")]
    Rejected { arena: usize, reason: String },

    /// The device layer failed internally.
    #[error("rebinding arena {arena} failed: {reason}")]
    Failed { arena: usize, reason: String },

    /// The device list names a device the layer does not know.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
}

impl RebindError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, RebindError::Rejected { .. })
    }
}
