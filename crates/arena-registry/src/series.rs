// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-interval value sequences.
//!
//! A [`Series`] is the history one profiler keeps for one arena: a gap-free
//! sequence of per-interval values, a running total, a peak, and a pending
//! accumulator that the profiler fills during an interval and the scheduler
//! folds in at the interval boundary.

/// Append-only per-interval history for one counter or gauge.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Series {
    /// One value per interval since the arena's first interval.
    values: Vec<u64>,
    /// Sum of all published values.
    total: u64,
    /// Largest published value.
    peak: u64,
    /// Value being accumulated for the in-progress interval.
    #[serde(skip)]
    pending: u64,
}

impl Series {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to the in-progress interval's accumulator (counters).
    pub fn accumulate(&mut self, n: u64) {
        self.pending = self.pending.saturating_add(n);
    }

    /// Overwrites the in-progress interval's value (gauges).
    pub fn set_pending(&mut self, value: u64) {
        self.pending = value;
    }

    /// Returns the in-progress accumulator.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Clears the in-progress accumulator without publishing it.
    pub fn clear_pending(&mut self) {
        self.pending = 0;
    }

    /// Publishes the pending value as this interval's slot and resets the
    /// accumulator.
    pub fn commit(&mut self) {
        let value = std::mem::take(&mut self.pending);
        self.publish(value);
    }

    /// Publishes the previous interval's value again, or zero if this is the
    /// first interval. Used on skipped intervals so the sequence has no gaps.
    pub fn carry_forward(&mut self) {
        let value = self.values.last().copied().unwrap_or(0);
        self.pending = 0;
        self.publish(value);
    }

    fn publish(&mut self, value: u64) {
        self.values.push(value);
        self.total = self.total.saturating_add(value);
        if value > self.peak {
            self.peak = value;
        }
    }

    /// Number of published intervals.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All published values, oldest first.
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// The most recently published value.
    pub fn last(&self) -> Option<u64> {
        self.values.last().copied()
    }

    /// Sum of all published values.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Largest published value.
    pub fn peak(&self) -> u64 {
        self.peak
    }

    /// The last `n` published values (fewer if the series is shorter).
    pub fn recent(&self, n: usize) -> &[u64] {
        let start = self.values.len().saturating_sub(n);
        &self.values[start..]
    }

    /// Value for a global interval index, given the interval at which the
    /// owning arena was created. Intervals before `first_interval` read as
    /// zero.
    pub fn value_at(&self, interval: u64, first_interval: u64) -> u64 {
        if interval < first_interval {
            return 0;
        }
        self.values
            .get((interval - first_interval) as usize)
            .copied()
            .unwrap_or(0)
    }
}
