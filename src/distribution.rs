//! Immutable statistical snapshot of historical market-maker scores.
//!
//! A distribution is built once per scoring epoch and replaced wholesale at
//! the next one. The precise valuation needs the sorted samples; the
//! approximate valuation only reads the summary fields, so a summary-only
//! snapshot (no samples) is a valid value too.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, MechanismError, Result};
use crate::fixed::EPSILON;
use crate::logging::hash_json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDistribution {
    /// Sorted ascending; empty for summary-only snapshots.
    samples: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: u64,
    pub epoch: u64,
}

impl PerformanceDistribution {
    pub fn from_samples(mut samples: Vec<f64>, epoch: u64) -> Result<Self> {
        if samples.is_empty() {
            return Err(MechanismError::invalid("empty sample set"));
        }
        for (i, s) in samples.iter().enumerate() {
            ensure_finite(&format!("sample[{}]", i), *s)?;
        }
        samples.sort_by(|a, b| a.total_cmp(b));

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        let min = samples[0];
        let max = samples[samples.len() - 1];
        // Summation error can push the mean a hair outside the range.
        let mean = mean.clamp(min, max);

        Ok(Self {
            sample_count: samples.len() as u64,
            samples,
            mean,
            stddev: var.max(0.0).sqrt(),
            min,
            max,
            epoch,
        })
    }

    pub fn from_summary(
        mean: f64,
        stddev: f64,
        min: f64,
        max: f64,
        sample_count: u64,
        epoch: u64,
    ) -> Result<Self> {
        for (name, v) in [("mean", mean), ("stddev", stddev), ("min", min), ("max", max)] {
            ensure_finite(name, v)?;
        }
        if stddev < 0.0 {
            return Err(MechanismError::invalid(format!("negative stddev {}", stddev)));
        }
        if min > max {
            return Err(MechanismError::invalid(format!("min {} exceeds max {}", min, max)));
        }
        if mean < min || mean > max {
            return Err(MechanismError::invalid(format!(
                "mean {} outside [{}, {}]",
                mean, min, max
            )));
        }
        Ok(Self {
            samples: Vec::new(),
            mean,
            stddev,
            min,
            max,
            sample_count,
            epoch,
        })
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    /// Fraction of historical samples `<= score`.
    pub fn empirical_cdf(&self, score: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let at_or_below = self.samples.partition_point(|s| *s <= score);
        at_or_below as f64 / self.samples.len() as f64
    }

    /// Silverman's rule: `n^-0.2 * stddev + ε`.
    pub fn silverman_bandwidth(&self) -> f64 {
        let n = self.samples.len().max(1) as f64;
        n.powf(-0.2) * self.stddev + EPSILON
    }

    /// Gaussian kernel density estimate at `score`.
    pub fn kernel_pdf(&self, score: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let h = self.silverman_bandwidth();
        let norm = 1.0 / ((2.0 * std::f64::consts::PI).sqrt() * h * self.samples.len() as f64);
        let sum: f64 = self
            .samples
            .iter()
            .map(|x| {
                let u = (score - x) / h;
                (-0.5 * u * u).exp()
            })
            .sum();
        sum * norm
    }

    /// SHA-256 of the canonical JSON form; two snapshots with equal digests
    /// produce identical valuations.
    pub fn digest(&self) -> String {
        hash_json(self)
    }
}

/// Parse a score list separated by newlines and/or commas. Blank lines,
/// `#` comments and a non-numeric header line are skipped.
pub fn parse_scores(text: &str) -> Result<Vec<f64>> {
    let mut scores = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for field in trimmed.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match field.parse::<f64>() {
                Ok(v) => scores.push(ensure_finite("score", v)?),
                Err(_) if line_no == 0 => break,
                Err(_) => {
                    return Err(MechanismError::invalid(format!(
                        "line {}: not a score: {:?}",
                        line_no + 1,
                        field
                    )))
                }
            }
        }
    }
    Ok(scores)
}

pub fn load_scores(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        MechanismError::invalid(format!("cannot read {}: {}", path.display(), err))
    })?;
    parse_scores(&text)
}
