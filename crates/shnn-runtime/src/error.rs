//! Error types for the execution engine

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced to the caller (spec.md §7)
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Network data model error (missing field, wrong type, bad topology)
    #[error("network error: {source}")]
    Network {
        /// Source error from `shnn-core`
        #[from]
        source: shnn_core::Error,
    },

    /// Storage layer error, surfaced during round-trip save/load
    #[error("storage error: {source}")]
    Storage {
        /// Source storage error
        #[from]
        source: shnn_storage::StorageError,
    },

    /// Missing required field, wrong type, or unrecognized enum value
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// A feedforward cluster's connection graph has a cycle, or another
    /// structural invariant was violated
    #[error("invalid topology: {reason}")]
    InvalidTopology {
        /// What was wrong
        reason: String,
    },

    /// Requested device id out of range
    #[error("invalid device id {device_id} (known devices: {device_count})")]
    InvalidDevice {
        /// The offending id
        device_id: u32,
        /// Number of known devices
        device_count: u32,
    },

    /// Allocation failure on host or device
    #[error("resource exhausted: {reason}")]
    ResourceExhausted {
        /// What could not be allocated
        reason: String,
    },

    /// An Attributes implementation rejected a cluster type
    #[error("model {model} is incompatible with cluster kind {cluster_kind}")]
    IncompatibleModel {
        /// Offending model name
        model: String,
        /// Offending cluster kind
        cluster_kind: String,
    },

    /// A connection's delay exceeds the 32-word history limit
    #[error("delay {delay} out of range (cap_delay={cap_delay})")]
    DelayOutOfRange {
        /// Requested delay
        delay: u32,
        /// Whether `cap_delay` was set
        cap_delay: bool,
    },

    /// Two simultaneously-active input modules target the same layer
    #[error("layer {layer_id} has conflicting coactive input modules")]
    CoactiveInputConflict {
        /// Offending layer
        layer_id: u32,
    },

    /// A second `Engine::run` was attempted while one was already running
    #[error("an engine is already running")]
    DuplicateEngine,
}

impl RuntimeError {
    /// Build an `InvalidConfig` error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Build an `InvalidTopology` error
    pub fn invalid_topology(reason: impl Into<String>) -> Self {
        Self::InvalidTopology {
            reason: reason.into(),
        }
    }

    /// Build a `ResourceExhausted` error
    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_engine_display() {
        let err = RuntimeError::DuplicateEngine;
        assert_eq!(err.to_string(), "an engine is already running");
    }
}
