//! Weight initialization and delay configuration (spec.md §4.4)

use crate::error::{Error, Result};

fn validate_fraction(fraction: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(Error::invalid_config(format!(
            "fraction must be in [0, 1], got {fraction}"
        )));
    }
    Ok(())
}

/// Tagged union describing how a [`crate::connection::Connection`]'s
/// weights should be initialized
#[derive(Debug, Clone)]
pub enum WeightConfig {
    /// Uniform value; `fraction` of weights set, remainder zero
    Flat {
        /// The value assigned to selected weights
        value: f32,
        /// Fraction of weights that receive `value`
        fraction: f32,
    },
    /// Uniform distribution on `[0, max]`
    UniformRandom {
        /// Upper bound of the uniform distribution
        max: f32,
        /// Fraction of weights initialized (rest are zero)
        fraction: f32,
    },
    /// Gaussian distribution, clamped to `[0, max_weight]`
    Gaussian {
        /// Mean
        mean: f32,
        /// Standard deviation
        std: f32,
        /// Fraction of weights initialized
        fraction: f32,
    },
    /// Log-normal distribution, clamped to `[0, max_weight]`
    LogNormal {
        /// Mean of the underlying normal distribution
        mean: f32,
        /// Standard deviation of the underlying normal distribution
        std: f32,
        /// Fraction of weights initialized
        fraction: f32,
    },
    /// Inverse-CDF sample on a bounded power law, clamped to `max_weight`
    PowerLaw {
        /// Power-law exponent
        exponent: f32,
        /// Fraction of weights initialized
        fraction: f32,
    },
    /// Explicit row-major values; count must equal the connection's weight
    /// count
    Specified {
        /// Whitespace-separated row-major float values
        values: String,
    },
    /// Initialize as `inner`, then zero a centered window
    ///
    /// Only valid for convergent/convolutional arborized connections
    /// (spec.md §4.4); non-square fields are rejected at build time if the
    /// window doesn't fit (spec.md §9 Open Questions).
    Surround {
        /// Inner config to seed the field before zeroing the window
        inner: Box<WeightConfig>,
        /// Window rows to zero, centered in the field
        rows: u32,
        /// Window columns to zero, centered in the field
        cols: u32,
    },
}

impl WeightConfig {
    /// Validate the `fraction ∈ [0, 1]` invariant recursively
    pub fn validate(&self) -> Result<()> {
        match self {
            WeightConfig::Flat { fraction, .. }
            | WeightConfig::UniformRandom { fraction, .. }
            | WeightConfig::Gaussian { fraction, .. }
            | WeightConfig::LogNormal { fraction, .. }
            | WeightConfig::PowerLaw { fraction, .. } => validate_fraction(*fraction),
            WeightConfig::Specified { .. } => Ok(()),
            WeightConfig::Surround { inner, .. } => inner.validate(),
        }
    }
}

/// Whether the diagonal of a connection's weight matrix should be zeroed
///
/// Only meaningful for square fully-connected or subset connections
/// (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagonalFlag(pub bool);

impl Default for DiagonalFlag {
    fn default() -> Self {
        Self(true)
    }
}

/// Hard upper bound on delay imposed by the 32-bit output history word
/// (spec.md §4.4, §6, §GLOSSARY)
pub const MAX_DELAY_BITS: u32 = 31;

/// Configuration for deriving per-weight delays from geometric distance
#[derive(Debug, Clone, Copy)]
pub struct DelayConfig {
    /// Flat delay added to every weight before the geometric term
    pub base_delay: u32,
    /// Conduction velocity (distance units per timestep); must be > 0
    pub conduction_velocity: f32,
    /// Accept delays beyond [`MAX_DELAY_BITS`] by clamping instead of
    /// raising `delay-out-of-range`
    pub cap_delay: bool,
}

impl DelayConfig {
    /// Derive a delay in timesteps from Euclidean distance (in grid units)
    pub fn delay_for_distance(&self, distance: f32) -> Result<u32> {
        if self.conduction_velocity <= 0.0 {
            return Err(Error::invalid_config(
                "conduction_velocity must be > 0",
            ));
        }
        let geometric = (distance / self.conduction_velocity).round() as u32;
        let total = self.base_delay + geometric;
        if total > MAX_DELAY_BITS {
            if self.cap_delay {
                return Ok(MAX_DELAY_BITS);
            }
            return Err(Error::DelayOutOfRange {
                delay: total,
                max_words: MAX_DELAY_BITS + 1,
                cap_delay: self.cap_delay,
            });
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_out_of_range_rejected() {
        let cfg = WeightConfig::Flat {
            value: 1.0,
            fraction: 1.5,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn delay_within_bound_accepted() {
        let cfg = DelayConfig {
            base_delay: 0,
            conduction_velocity: 1.0,
            cap_delay: false,
        };
        assert_eq!(cfg.delay_for_distance(31.0).unwrap(), 31);
    }

    #[test]
    fn delay_beyond_bound_without_cap_errors() {
        let cfg = DelayConfig {
            base_delay: 0,
            conduction_velocity: 1.0,
            cap_delay: false,
        };
        assert!(cfg.delay_for_distance(32.0).is_err());
    }

    #[test]
    fn delay_beyond_bound_with_cap_clamps() {
        let cfg = DelayConfig {
            base_delay: 0,
            conduction_velocity: 1.0,
            cap_delay: true,
        };
        assert_eq!(cfg.delay_for_distance(1000.0).unwrap(), MAX_DELAY_BITS);
    }
}
