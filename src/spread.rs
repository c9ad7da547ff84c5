//! Crisis spread, decomposed into a monopoly component (market power of the
//! few makers still quoting) and an adverse-selection component (losses to
//! better-informed flow). The total is capped per tier.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ensure_finite, ensure_unit_interval, MechanismError, Result};
use crate::fixed::guarded_div;
use crate::tier::Tier;

/// Substituted for a zero `normal_vol`.
pub const DEFAULT_NORMAL_VOL: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadInputs {
    pub base_price: f64,
    pub current_vol: f64,
    pub normal_vol: f64,
    /// Maker's information advantage in [0, 1].
    pub info_advantage: f64,
    pub risk_aversion: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrisisSpreadBreakdown {
    pub base_spread: f64,
    pub monopoly_component: f64,
    pub adverse_selection_component: f64,
    pub total_spread: f64,
    pub volatility_multiplier: f64,
    pub capped: bool,
}

/// Maximum spread per tier, in bps of the base price. `None` is uncapped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadCaps {
    pub martyr_bps: Option<f64>,
    pub citizen_bps: Option<f64>,
    pub sovereign_bps: Option<f64>,
}

impl Default for SpreadCaps {
    fn default() -> Self {
        Self {
            martyr_bps: Some(50.0),
            citizen_bps: Some(200.0),
            sovereign_bps: None,
        }
    }
}

impl SpreadCaps {
    pub fn cap_bps(&self, tier: Tier) -> Option<f64> {
        match tier {
            Tier::Martyr => self.martyr_bps,
            Tier::Citizen => self.citizen_bps,
            Tier::Sovereign => self.sovereign_bps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrisisSpreadCalculator {
    pub base_spread_bps: f64,
    pub adverse_param: f64,
    pub caps: SpreadCaps,
}

impl Default for CrisisSpreadCalculator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl CrisisSpreadCalculator {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            base_spread_bps: cfg.base_spread_bps,
            adverse_param: cfg.spread_adverse_param,
            caps: SpreadCaps {
                martyr_bps: Some(cfg.cap_martyr_bps),
                citizen_bps: Some(cfg.cap_citizen_bps),
                sovereign_bps: None,
            },
        }
    }

    /// Spread for a quote by a maker of `tier`; `None` skips the cap table.
    pub fn compute(&self, inputs: &SpreadInputs, tier: Option<Tier>) -> Result<CrisisSpreadBreakdown> {
        let SpreadInputs {
            base_price,
            current_vol,
            normal_vol,
            info_advantage,
            risk_aversion,
        } = *inputs;
        for (name, v) in [
            ("base_price", base_price),
            ("current_vol", current_vol),
            ("normal_vol", normal_vol),
            ("risk_aversion", risk_aversion),
        ] {
            ensure_finite(name, v)?;
            if v < 0.0 {
                return Err(MechanismError::invalid(format!("{} must be non-negative, got {}", name, v)));
            }
        }
        ensure_unit_interval("info_advantage", info_advantage)?;

        let normal_vol = if normal_vol == 0.0 { DEFAULT_NORMAL_VOL } else { normal_vol };
        let volatility_multiplier = guarded_div(current_vol, normal_vol, 1.0);
        let base_spread = base_price * self.base_spread_bps / 10_000.0;

        let monopoly_component =
            base_spread * volatility_multiplier * risk_aversion / (1.0 + info_advantage);
        let adverse_selection_component = base_spread
            * volatility_multiplier
            * (1.0 - info_advantage)
            * risk_aversion
            * self.adverse_param;

        let uncapped = monopoly_component + adverse_selection_component;
        let cap = tier
            .and_then(|t| self.caps.cap_bps(t))
            .map(|bps| base_price * bps / 10_000.0);
        let (total_spread, capped) = match cap {
            Some(c) if uncapped > c => (c, true),
            _ => (uncapped, false),
        };

        Ok(CrisisSpreadBreakdown {
            base_spread,
            monopoly_component,
            adverse_selection_component,
            total_spread,
            volatility_multiplier,
            capped,
        })
    }
}
