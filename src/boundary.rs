//! Tier boundaries (virtual-value roots) and tier assignment.
//!
//! The upper root is where the commit-side virtual value changes sign; the
//! lower root is where the exit-side value does. Scores strictly between the
//! two fall in the no-trade gap. Bisection always runs a bounded number of
//! iterations so solving cost is the same on every host.

use serde::{Deserialize, Serialize};

use crate::distribution::PerformanceDistribution;
use crate::error::{MechanismError, Result};
use crate::tier::Tier;
use crate::virtual_value::{Side, VirtualValueStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBoundaries {
    pub upper_root: f64,
    pub lower_root: f64,
    /// `max(0, upper_root - lower_root)`
    pub gap_width: f64,
    pub epoch: u64,
    pub valid: bool,
}

impl TierBoundaries {
    pub fn new(upper_root: f64, lower_root: f64, epoch: u64) -> Self {
        let valid = upper_root.is_finite() && lower_root.is_finite();
        Self {
            upper_root,
            lower_root,
            gap_width: (upper_root - lower_root).max(0.0),
            epoch,
            valid,
        }
    }

    /// Boundaries computed out of band and handed in by the publisher.
    pub fn published(upper_root: f64, lower_root: f64, epoch: u64) -> Result<Self> {
        let b = Self::new(upper_root, lower_root, epoch);
        if !b.valid {
            return Err(MechanismError::invalid(format!(
                "published roots must be finite: upper={}, lower={}",
                upper_root, lower_root
            )));
        }
        Ok(b)
    }

    pub fn invalid(epoch: u64) -> Self {
        Self {
            upper_root: f64::NAN,
            lower_root: f64::NAN,
            gap_width: 0.0,
            epoch,
            valid: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierDecision {
    Martyr,
    Sovereign,
    /// Inside the no-trade gap.
    Reject,
}

impl TierDecision {
    pub fn tier(&self) -> Option<Tier> {
        match self {
            TierDecision::Martyr => Some(Tier::Martyr),
            TierDecision::Sovereign => Some(Tier::Sovereign),
            TierDecision::Reject => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TierDecision::Martyr => "martyr",
            TierDecision::Sovereign => "sovereign",
            TierDecision::Reject => "reject",
        }
    }
}

/// Ties resolve to assignment: `score == upper_root` is Martyr and
/// `score == lower_root` is Sovereign. The upper check wins when the roots
/// cross. Invalid boundaries reject everyone.
pub fn allocate_tier(score: f64, boundaries: &TierBoundaries) -> TierDecision {
    if !boundaries.valid {
        return TierDecision::Reject;
    }
    if score >= boundaries.upper_root {
        TierDecision::Martyr
    } else if score <= boundaries.lower_root {
        TierDecision::Sovereign
    } else {
        TierDecision::Reject
    }
}

/// Boundaries plus the iteration counts bisection actually used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub boundaries: TierBoundaries,
    pub upper_iterations: u32,
    pub lower_iterations: u32,
}

pub struct TierBoundarySolver<S> {
    strategy: S,
    max_iterations: u32,
    tolerance: f64,
}

impl<S: VirtualValueStrategy> TierBoundarySolver<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }

    pub fn with_limits(mut self, max_iterations: u32, tolerance: f64) -> Self {
        self.max_iterations = max_iterations;
        self.tolerance = tolerance;
        self
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn solve(&self, dist: &PerformanceDistribution) -> Result<TierBoundaries> {
        self.solve_with_report(dist).map(|r| r.boundaries)
    }

    pub fn solve_with_report(&self, dist: &PerformanceDistribution) -> Result<SolveReport> {
        // A precise strategy over a sample-less snapshot fails on the first
        // evaluation with InvalidInput.
        if !(dist.max > dist.min) {
            return Err(MechanismError::BoundaryUndefined {
                min: dist.min,
                max: dist.max,
            });
        }

        // Commit value turns positive going up; exit value turns negative.
        let (upper, upper_iterations) = self.bisect(dist, Side::Commit, true)?;
        let (lower, lower_iterations) = self.bisect(dist, Side::Exit, false)?;

        Ok(SolveReport {
            boundaries: TierBoundaries::new(upper, lower, dist.epoch),
            upper_iterations,
            lower_iterations,
        })
    }

    /// Sign-change bisection over `[min, max]`.
    ///
    /// `rising` names the crossing sought: negative-to-positive (`true`) or
    /// positive-to-negative (`false`). Without a sign change the root clamps
    /// to the end of the bracket where the crossing would lie.
    fn bisect(&self, dist: &PerformanceDistribution, side: Side, rising: bool) -> Result<(f64, u32)> {
        let value = |x: f64| self.strategy.signed_value(x, dist, side);
        let mut lo = dist.min;
        let mut hi = dist.max;
        let f_lo = value(lo)?;
        let f_hi = value(hi)?;

        if f_lo.abs() < self.tolerance {
            return Ok((lo, 0));
        }
        if f_hi.abs() < self.tolerance {
            return Ok((hi, 0));
        }
        let lo_positive = f_lo > 0.0;
        if lo_positive == (f_hi > 0.0) {
            // Curve never crosses: all-positive puts a rising root at `min`
            // and a falling root at `max`, all-negative the reverse.
            let root = if lo_positive == rising { lo } else { hi };
            return Ok((root, 0));
        }

        for i in 0..self.max_iterations {
            let mid = lo + (hi - lo) / 2.0;
            let f_mid = value(mid)?;
            if f_mid.abs() < self.tolerance {
                return Ok((mid, i + 1));
            }
            if (f_mid > 0.0) == lo_positive {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok((lo + (hi - lo) / 2.0, self.max_iterations))
    }
}
