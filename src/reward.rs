//! Incentive-compatible reward: the integral of the commit-side virtual value.
//!
//! Both integration schemes run a fixed amount of work for a given input.
//! They are expected to disagree by roughly `step * max_slope * range`;
//! compare them with a tolerance.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::distribution::PerformanceDistribution;
use crate::error::{ensure_finite, MechanismError, Result};
use crate::virtual_value::{ExecutionContext, Side, VirtualValueStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Integration {
    /// Left-endpoint summation; cost grows with the score range.
    UnitStep { step: f64 },
    /// Composite Simpson's rule with a fixed segment count (rounded up to even).
    Simpson { segments: u32 },
}

impl Integration {
    /// Metered contexts sum unit steps; the precise context uses Simpson.
    pub fn for_context(context: ExecutionContext, cfg: &Config) -> Self {
        match context {
            ExecutionContext::Precise => Integration::Simpson {
                segments: cfg.simpson_segments,
            },
            ExecutionContext::Approximate => Integration::UnitStep { step: cfg.unit_step },
        }
    }
}

pub struct RewardIntegrator<S> {
    strategy: S,
    integration: Integration,
}

impl<S: VirtualValueStrategy> RewardIntegrator<S> {
    pub fn new(strategy: S, integration: Integration) -> Self {
        Self {
            strategy,
            integration,
        }
    }

    pub fn integration(&self) -> Integration {
        self.integration
    }

    /// Reward density at `score`: the floored commit-side virtual value.
    pub fn marginal_reward(&self, score: f64, dist: &PerformanceDistribution) -> Result<f64> {
        Ok(self.strategy.compute(score, dist, Side::Commit)?.virtual_value)
    }

    /// Integral of the marginal reward over `[min, min(score, max)]`; zero
    /// below `min`. Non-decreasing in `score` because the integrand is floored.
    pub fn cumulative_reward(&self, score: f64, dist: &PerformanceDistribution) -> Result<f64> {
        ensure_finite("score", score)?;
        let upper = score.min(dist.max);
        if score < dist.min || upper <= dist.min {
            return Ok(0.0);
        }
        match self.integration {
            Integration::UnitStep { step } => self.unit_step(dist.min, upper, step, dist),
            Integration::Simpson { segments } => self.simpson(dist.min, upper, segments, dist),
        }
    }

    fn unit_step(&self, lo: f64, hi: f64, step: f64, dist: &PerformanceDistribution) -> Result<f64> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(MechanismError::invalid(format!("integration step must be positive, got {}", step)));
        }
        let range = hi - lo;
        let full_steps = (range / step).floor() as u64;
        let mut total = 0.0;
        for i in 0..full_steps {
            total += self.marginal_reward(lo + i as f64 * step, dist)? * step;
        }
        let remainder = range - full_steps as f64 * step;
        if remainder > 0.0 {
            total += self.marginal_reward(lo + full_steps as f64 * step, dist)? * remainder;
        }
        Ok(total)
    }

    fn simpson(&self, lo: f64, hi: f64, segments: u32, dist: &PerformanceDistribution) -> Result<f64> {
        let n = match segments.max(2) {
            s if s % 2 == 1 => s + 1,
            s => s,
        };
        let h = (hi - lo) / n as f64;
        let mut total = self.marginal_reward(lo, dist)? + self.marginal_reward(hi, dist)?;
        for i in 1..n {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            total += weight * self.marginal_reward(lo + i as f64 * h, dist)?;
        }
        Ok(total * h / 3.0)
    }
}
