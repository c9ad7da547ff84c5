//! Error kinds surfaced by the mechanism core.
//!
//! Division by a possibly-zero denominator is never an error here: those
//! paths degrade to a documented fallback through [`crate::fixed::guarded_div`].

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MechanismError {
    /// Caller supplied data outside the documented domain (empty sample set,
    /// non-finite values, fractions outside [0, 1], ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Bisection was asked to bracket a root on a degenerate interval.
    #[error("tier boundary undefined: degenerate score range [{min}, {max}]")]
    BoundaryUndefined { min: f64, max: f64 },
    /// A snapshot publication did not advance the epoch.
    #[error("stale epoch: current {current}, proposed {proposed}")]
    StaleEpoch { current: u64, proposed: u64 },
    /// Boundaries were published for a different epoch than the held distribution.
    #[error("epoch mismatch: distribution {distribution}, boundaries {proposed}")]
    EpochMismatch { distribution: u64, proposed: u64 },
}

impl MechanismError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MechanismError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MechanismError>;

/// Reject NaN and infinities with a named field in the message.
pub(crate) fn ensure_finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MechanismError::invalid(format!("{} must be finite, got {}", name, value)))
    }
}

/// Reject values outside [0, 1].
pub(crate) fn ensure_unit_interval(name: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(MechanismError::invalid(format!("{} must lie in [0, 1], got {}", name, value)))
    }
}
