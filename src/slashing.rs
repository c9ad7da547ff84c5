//! Overclaim penalties and credibility updates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distribution::PerformanceDistribution;
use crate::error::{ensure_finite, ensure_unit_interval, MechanismError, Result};
use crate::virtual_value::{Side, VirtualValueStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashReason {
    /// Claimed score did not exceed the verified one.
    Honest,
    /// Claim was higher but bought no extra virtual value.
    NoExcessValue,
    /// Slashed by the full overclaim.
    Overclaim,
    /// Overclaim exceeded the cap; slashed by the cap.
    Capped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlashOutcome {
    pub slash_amount: f64,
    pub overclaim: f64,
    pub claimed_value: f64,
    pub verified_value: f64,
    pub reason: SlashReason,
}

impl SlashOutcome {
    pub fn justification(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SlashOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            SlashReason::Honest => write!(f, "claim within verified score; no slash"),
            SlashReason::NoExcessValue => write!(
                f,
                "claim above verified score but virtual value unchanged ({:.6}); no slash",
                self.verified_value
            ),
            SlashReason::Overclaim => write!(
                f,
                "virtual value overclaimed by {:.6} ({:.6} vs verified {:.6})",
                self.overclaim, self.claimed_value, self.verified_value
            ),
            SlashReason::Capped => write!(
                f,
                "virtual value overclaimed by {:.6}; slash capped at {:.6}",
                self.overclaim, self.slash_amount
            ),
        }
    }
}

pub struct SlashingEngine<S> {
    strategy: S,
    max_slash_fraction: f64,
}

impl<S: VirtualValueStrategy> SlashingEngine<S> {
    pub fn new(strategy: S, max_slash_fraction: f64) -> Result<Self> {
        ensure_unit_interval("max_slash_fraction", max_slash_fraction)?;
        Ok(Self {
            strategy,
            max_slash_fraction,
        })
    }

    pub fn max_slash_fraction(&self) -> f64 {
        self.max_slash_fraction
    }

    /// `slash = min(max(0, vv(claimed) - vv(verified)), max_slash_fraction)`.
    pub fn compute(
        &self,
        claimed_score: f64,
        verified_score: f64,
        dist: &PerformanceDistribution,
    ) -> Result<SlashOutcome> {
        ensure_finite("claimed_score", claimed_score)?;
        ensure_finite("verified_score", verified_score)?;
        let claimed_value = self.strategy.compute(claimed_score, dist, Side::Commit)?.virtual_value;
        let verified_value = self.strategy.compute(verified_score, dist, Side::Commit)?.virtual_value;

        if claimed_score <= verified_score {
            return Ok(SlashOutcome {
                slash_amount: 0.0,
                overclaim: 0.0,
                claimed_value,
                verified_value,
                reason: SlashReason::Honest,
            });
        }

        let overclaim = (claimed_value - verified_value).max(0.0);
        let (slash_amount, reason) = if overclaim == 0.0 {
            (0.0, SlashReason::NoExcessValue)
        } else if overclaim > self.max_slash_fraction {
            (self.max_slash_fraction, SlashReason::Capped)
        } else {
            (overclaim, SlashReason::Overclaim)
        };

        Ok(SlashOutcome {
            slash_amount,
            overclaim,
            claimed_value,
            verified_value,
            reason,
        })
    }
}

/// Convex-combination belief update from a verification outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CredibilityUpdater {
    weight: f64,
}

impl CredibilityUpdater {
    pub fn new(weight: f64) -> Result<Self> {
        ensure_unit_interval("weight", weight)?;
        Ok(Self { weight })
    }

    pub fn update(&self, prior: f64, proof_outcome: f64) -> Result<f64> {
        update_credibility(prior, proof_outcome, self.weight)
    }

    /// Integer twin: `weight_bps` in [0, 10_000].
    pub fn update_bps(prior: u64, proof_outcome: u64, weight_bps: u64) -> Result<u64> {
        if weight_bps > 10_000 {
            return Err(MechanismError::invalid(format!(
                "weight_bps must be <= 10000, got {}",
                weight_bps
            )));
        }
        let w = weight_bps as u128;
        let blended = (w * proof_outcome as u128 + (10_000 - w) * prior as u128) / 10_000;
        // A convex combination never exceeds the larger input.
        Ok(blended as u64)
    }
}

/// `weight * outcome + (1 - weight) * prior`
pub fn update_credibility(prior: f64, proof_outcome: f64, weight: f64) -> Result<f64> {
    ensure_finite("prior", prior)?;
    ensure_finite("proof_outcome", proof_outcome)?;
    ensure_unit_interval("weight", weight)?;
    Ok(weight * proof_outcome + (1.0 - weight) * prior)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_value::ApproximateStrategy;

    fn summary() -> PerformanceDistribution {
        PerformanceDistribution::from_summary(90.0, 5.0, 75.0, 100.0, 0, 1).unwrap()
    }

    fn engine(cap: f64) -> SlashingEngine<ApproximateStrategy> {
        SlashingEngine::new(ApproximateStrategy::default(), cap).unwrap()
    }

    #[test]
    fn test_honest_and_underclaim_never_slashed() {
        let d = summary();
        let e = engine(0.3);
        let honest = e.compute(88.0, 88.0, &d).unwrap();
        let under = e.compute(80.0, 95.0, &d).unwrap();
        assert_eq!(honest.slash_amount, 0.0);
        assert_eq!(under.slash_amount, 0.0);
        assert_eq!(under.reason, SlashReason::Honest);
    }

    #[test]
    fn test_overclaim_slashed_up_to_cap() {
        let d = summary();
        // v(s) = s - 5 - 0.5|s - 90|; 90.2 vs 90.0 is worth 0.1.
        let small = engine(0.3).compute(90.2, 90.0, &d).unwrap();
        assert!((small.slash_amount - 0.1).abs() < 1e-9);
        assert_eq!(small.reason, SlashReason::Overclaim);

        let big = engine(0.3).compute(99.0, 80.0, &d).unwrap();
        assert_eq!(big.slash_amount, 0.3);
        assert_eq!(big.reason, SlashReason::Capped);
        assert!(big.overclaim > 0.3);
        assert!(big.justification().contains("capped"));
    }

    #[test]
    fn test_floored_region_has_nothing_to_slash() {
        let d = PerformanceDistribution::from_summary(90.0, 50.0, 0.0, 100.0, 0, 1).unwrap();
        let out = engine(0.3).compute(2.0, 1.0, &d).unwrap();
        assert_eq!(out.slash_amount, 0.0);
        assert_eq!(out.reason, SlashReason::NoExcessValue);
    }

    #[test]
    fn test_cap_must_be_a_fraction() {
        assert!(SlashingEngine::new(ApproximateStrategy::default(), 1.2).is_err());
    }

    #[test]
    fn test_credibility_update() {
        let v = update_credibility(500.0, 1000.0, 0.7).unwrap();
        assert!((v - 850.0).abs() < 1e-9);
        assert_eq!(CredibilityUpdater::update_bps(500, 1000, 7000).unwrap(), 850);
        assert_eq!(CredibilityUpdater::update_bps(500, 1000, 0).unwrap(), 500);
        assert_eq!(CredibilityUpdater::update_bps(500, 1000, 10_000).unwrap(), 1000);
        assert!(CredibilityUpdater::update_bps(500, 1000, 10_001).is_err());
        assert!(update_credibility(500.0, 1000.0, -0.1).is_err());
    }

    #[test]
    fn test_updater_holds_weight() {
        let u = CredibilityUpdater::new(0.25).unwrap();
        assert!((u.update(400.0, 800.0).unwrap() - 500.0).abs() < 1e-9);
        assert!(CredibilityUpdater::new(2.0).is_err());
    }
}
