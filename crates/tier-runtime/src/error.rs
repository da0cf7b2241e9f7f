// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the profiling runtime.

/// Errors that can occur while configuring or running a profiling session.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Arena bookkeeping failed (capacity violations, unknown arenas).
    #[error("registry error: {0}")]
    Registry(#[from] arena_registry::RegistryError),

    /// A profiler could not be set up.
    #[error("profiler error: {0}")]
    Profiler(#[from] sample_profilers::ProfilerError),

    /// The tiering engine rejected its configuration.
    #[error("tiering error: {0}")]
    Tiering(#[from] tiering_engine::TieringError),

    /// Failed to read an options file.
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Options are malformed or out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// The control thread could not be started or did not exit cleanly.
    #[error("control thread error: {0}")]
    ControlThread(String),
}

impl RuntimeError {
    /// Whether the allocator runtime should terminate the process.
    ///
    /// Only non-fatal registry conditions (e.g. an inverted extent range)
    /// are recoverable; everything else happens at setup or teardown.
    pub fn is_fatal(&self) -> bool {
        match self {
            RuntimeError::Registry(e) => e.is_fatal(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_registry::RegistryError;

    #[test]
    fn test_registry_fatality_passes_through() {
        let fatal: RuntimeError = RegistryError::ArenaLimitExceeded {
            index: 9,
            max_arenas: 8,
        }
        .into();
        assert!(fatal.is_fatal());

        let soft: RuntimeError = RegistryError::InvalidExtent { start: 8, end: 4 }.into();
        assert!(!soft.is_fatal());
        assert!(soft.to_string().starts_with("registry error"));
    }

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(RuntimeError::Config("period_ns must be non-zero".into()).is_fatal());
    }
}
