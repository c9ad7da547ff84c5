//! Virtual value: a score net of information rent and adverse-selection
//! penalty.
//!
//! Two interchangeable strategies sit behind [`VirtualValueStrategy`]:
//!
//! - [`PreciseStrategy`] reads the empirical CDF and a kernel density estimate
//!   of the historical samples (hazard-rate rent).
//! - [`ApproximateStrategy`] reads only the summary fields and evaluates in
//!   guarded fixed point, for contexts where every operation is metered.
//!
//! The two formula families are not algebraically identical; callers compare
//! them with tolerances, never bit-for-bit.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::distribution::PerformanceDistribution;
use crate::error::{ensure_finite, MechanismError, Result};
use crate::fixed::{self, SCALE};

/// Which side of the no-trade gap a value is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Upper side: rent `(1 - F) / f`. Floored at zero; drives rewards and slashing.
    Commit,
    /// Lower side: rent `F / f`. Signed; used only for root-sign tests.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirtualValueBreakdown {
    pub side: Side,
    pub raw_score: f64,
    pub information_rent: f64,
    pub adverse_selection_penalty: f64,
    pub virtual_value: f64,
}

/// Execution context selecting the valuation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    Precise,
    Approximate,
}

impl ExecutionContext {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "precise" => Some(ExecutionContext::Precise),
            "approximate" | "approx" => Some(ExecutionContext::Approximate),
            _ => None,
        }
    }
}

pub trait VirtualValueStrategy {
    fn name(&self) -> &'static str;

    /// Unfloored value, for bisection sign tests.
    fn signed_value(&self, score: f64, dist: &PerformanceDistribution, side: Side) -> Result<f64>;

    fn compute(
        &self,
        score: f64,
        dist: &PerformanceDistribution,
        side: Side,
    ) -> Result<VirtualValueBreakdown>;
}

// =============================================================================
// Precise
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreciseStrategy {
    pub epsilon: f64,
    pub adverse_lambda: f64,
    pub crisis_lambda: f64,
}

impl Default for PreciseStrategy {
    fn default() -> Self {
        let cfg = Config::default();
        Self::from_config(&cfg)
    }
}

impl PreciseStrategy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            epsilon: cfg.epsilon,
            adverse_lambda: cfg.adverse_lambda,
            crisis_lambda: cfg.crisis_lambda,
        }
    }

    /// (rent, penalty, signed value)
    fn evaluate(&self, score: f64, dist: &PerformanceDistribution, side: Side) -> Result<(f64, f64, f64)> {
        ensure_finite("score", score)?;
        if !dist.has_samples() {
            return Err(MechanismError::invalid(
                "precise valuation needs historical samples",
            ));
        }
        let cdf = dist.empirical_cdf(score);
        let pdf = dist.kernel_pdf(score);
        let (tail, lambda) = match side {
            Side::Commit => (1.0 - cdf, self.adverse_lambda),
            Side::Exit => (cdf, self.crisis_lambda),
        };
        let rent = tail / (pdf + self.epsilon);
        let z = (score - dist.mean).abs() / (dist.stddev + self.epsilon);
        let penalty = lambda * z * rent;
        Ok((rent, penalty, score - rent - penalty))
    }
}

impl VirtualValueStrategy for PreciseStrategy {
    fn name(&self) -> &'static str {
        "precise"
    }

    fn signed_value(&self, score: f64, dist: &PerformanceDistribution, side: Side) -> Result<f64> {
        self.evaluate(score, dist, side).map(|(_, _, v)| v)
    }

    fn compute(
        &self,
        score: f64,
        dist: &PerformanceDistribution,
        side: Side,
    ) -> Result<VirtualValueBreakdown> {
        let (rent, penalty, signed) = self.evaluate(score, dist, side)?;
        let virtual_value = match side {
            Side::Commit => signed.max(0.0),
            Side::Exit => signed,
        };
        Ok(VirtualValueBreakdown {
            side,
            raw_score: score,
            information_rent: rent,
            adverse_selection_penalty: penalty,
            virtual_value,
        })
    }
}

// =============================================================================
// Approximate (fixed point)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproximateStrategy {
    pub penalty_param: f64,
}

impl Default for ApproximateStrategy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ApproximateStrategy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            penalty_param: cfg.approx_penalty_param,
        }
    }

    /// (rent, penalty, signed value), all fixed point.
    fn evaluate(&self, score: f64, dist: &PerformanceDistribution) -> Result<(i128, i128, i128)> {
        ensure_finite("score", score)?;
        let s = fixed::to_fixed(score);
        let mu = fixed::to_fixed(dist.mean);
        let sigma = fixed::to_fixed(dist.stddev);
        let n = dist.sample_count as i128;

        // σ / n with a one-ulp guard; σ itself when there is no count.
        let rent = if n == 0 {
            sigma
        } else {
            fixed::mul_div(sigma, SCALE, n.saturating_mul(SCALE).saturating_add(1), sigma)
        };
        let penalty = if sigma == 0 {
            0
        } else {
            let dev = s.saturating_sub(mu).saturating_abs();
            let scaled = fixed::mul_div(dev, rent, sigma, 0);
            fixed::mul(scaled, fixed::to_fixed(self.penalty_param))
        };
        // Scores far outside the fixed-point range saturate instead of wrapping.
        Ok((rent, penalty, s.saturating_sub(rent).saturating_sub(penalty)))
    }
}

impl VirtualValueStrategy for ApproximateStrategy {
    fn name(&self) -> &'static str {
        "approximate"
    }

    fn signed_value(&self, score: f64, dist: &PerformanceDistribution, _side: Side) -> Result<f64> {
        self.evaluate(score, dist).map(|(_, _, v)| fixed::from_fixed(v))
    }

    fn compute(
        &self,
        score: f64,
        dist: &PerformanceDistribution,
        side: Side,
    ) -> Result<VirtualValueBreakdown> {
        let (rent, penalty, signed) = self.evaluate(score, dist)?;
        Ok(VirtualValueBreakdown {
            side,
            raw_score: score,
            information_rent: fixed::from_fixed(rent),
            adverse_selection_penalty: fixed::from_fixed(penalty),
            virtual_value: fixed::from_fixed(signed.max(0)),
        })
    }
}

// =============================================================================
// Context dispatch
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValuationStrategy {
    Precise(PreciseStrategy),
    Approximate(ApproximateStrategy),
}

impl ValuationStrategy {
    pub fn from_config(cfg: &Config) -> Self {
        match cfg.context {
            ExecutionContext::Precise => ValuationStrategy::Precise(PreciseStrategy::from_config(cfg)),
            ExecutionContext::Approximate => {
                ValuationStrategy::Approximate(ApproximateStrategy::from_config(cfg))
            }
        }
    }

    pub fn context(&self) -> ExecutionContext {
        match self {
            ValuationStrategy::Precise(_) => ExecutionContext::Precise,
            ValuationStrategy::Approximate(_) => ExecutionContext::Approximate,
        }
    }
}

impl VirtualValueStrategy for ValuationStrategy {
    fn name(&self) -> &'static str {
        match self {
            ValuationStrategy::Precise(s) => s.name(),
            ValuationStrategy::Approximate(s) => s.name(),
        }
    }

    fn signed_value(&self, score: f64, dist: &PerformanceDistribution, side: Side) -> Result<f64> {
        match self {
            ValuationStrategy::Precise(s) => s.signed_value(score, dist, side),
            ValuationStrategy::Approximate(s) => s.signed_value(score, dist, side),
        }
    }

    fn compute(
        &self,
        score: f64,
        dist: &PerformanceDistribution,
        side: Side,
    ) -> Result<VirtualValueBreakdown> {
        match self {
            ValuationStrategy::Precise(s) => s.compute(score, dist, side),
            ValuationStrategy::Approximate(s) => s.compute(score, dist, side),
        }
    }
}

/// Commit-side virtual value of `score`.
pub fn compute_virtual_value<S: VirtualValueStrategy + ?Sized>(
    score: f64,
    dist: &PerformanceDistribution,
    strategy: &S,
) -> Result<VirtualValueBreakdown> {
    strategy.compute(score, dist, Side::Commit)
}
