//! Error types for the network data model

use thiserror::Error;

/// Result type for `shnn-core` operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while describing or validating a network
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Missing required field, wrong type, or unrecognized enum value
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// A structural invariant of the layer/connection graph was violated
    #[error("invalid topology: {reason}")]
    InvalidTopology {
        /// What was wrong
        reason: String,
    },

    /// A connection's delay exceeds the 32 * history-word limit without `cap_delay`
    #[error("delay {delay} out of range for layer with {max_words} output words (cap_delay={cap_delay})")]
    DelayOutOfRange {
        /// Requested delay, in timesteps
        delay: u32,
        /// Number of output words available for the destination layer
        max_words: u32,
        /// Whether the caller had set `cap_delay`
        cap_delay: bool,
    },
}

impl Error {
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
}
