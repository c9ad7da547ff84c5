//! Crisis oracle: turns live market metrics into a crisis flag plus the
//! dominant trigger.
//!
//! Checks run in a fixed order. Every check that fires contributes to
//! `is_crisis`; `trigger_type` records only the first one. Stabilization uses
//! tighter thresholds than detection so the flag does not flap at the edge.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{MechanismError, Result};
use crate::fixed::ratio_bps;

/// Liquidity ratio reported when there was no prior liquidity to drain.
pub const FULL_LIQUIDITY_BPS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    None,
    Volatility,
    Liquidity,
    Spread,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::None => "none",
            TriggerType::Volatility => "volatility",
            TriggerType::Liquidity => "liquidity",
            TriggerType::Spread => "spread",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisDetectionResult {
    pub is_crisis: bool,
    pub trigger_type: TriggerType,
    pub volatility_bps: u64,
    pub liquidity_remaining_bps: u64,
    pub avg_spread_bps: u64,
    pub timestamp: u64,
    /// Every check that fired, in evaluation order.
    pub fired: Vec<TriggerType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleThresholds {
    pub crisis_vol_bps: u64,
    pub crisis_liquidity_bps: u64,
    pub crisis_spread_bps: u64,
    pub stable_vol_bps: u64,
    pub stable_liquidity_bps: u64,
    pub stable_spread_bps: u64,
}

impl Default for OracleThresholds {
    fn default() -> Self {
        Self {
            crisis_vol_bps: 3000,
            crisis_liquidity_bps: 6000,
            crisis_spread_bps: 1000,
            stable_vol_bps: 2000,
            stable_liquidity_bps: 7000,
            stable_spread_bps: 500,
        }
    }
}

impl OracleThresholds {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            crisis_vol_bps: cfg.crisis_vol_bps,
            crisis_liquidity_bps: cfg.crisis_liquidity_bps,
            crisis_spread_bps: cfg.crisis_spread_bps,
            stable_vol_bps: cfg.stable_vol_bps,
            stable_liquidity_bps: cfg.stable_liquidity_bps,
            stable_spread_bps: cfg.stable_spread_bps,
        }
    }

    /// The stabilization band must sit strictly inside the crisis band.
    pub fn validate(&self) -> Result<()> {
        if self.stable_vol_bps >= self.crisis_vol_bps
            || self.stable_liquidity_bps <= self.crisis_liquidity_bps
            || self.stable_spread_bps >= self.crisis_spread_bps
        {
            return Err(MechanismError::invalid(format!(
                "stabilization thresholds must be tighter than crisis thresholds: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Observed metrics a check reads.
#[derive(Debug, Clone, Copy)]
struct Metrics {
    volatility_bps: u64,
    liquidity_remaining_bps: u64,
    spread_bps: u64,
}

type Check = (TriggerType, fn(&Metrics, &OracleThresholds) -> bool);

/// Evaluation order decides `trigger_type`.
const CRISIS_CHECKS: [Check; 3] = [
    (TriggerType::Volatility, |m: &Metrics, t: &OracleThresholds| m.volatility_bps > t.crisis_vol_bps),
    (TriggerType::Liquidity, |m: &Metrics, t: &OracleThresholds| {
        m.liquidity_remaining_bps < t.crisis_liquidity_bps
    }),
    (TriggerType::Spread, |m: &Metrics, t: &OracleThresholds| m.spread_bps > t.crisis_spread_bps),
];

/// `|curr - prev| * 10000 / prev`; 0 when `prev == 0`.
pub fn calculate_volatility(prev_price: u64, curr_price: u64) -> u64 {
    ratio_bps(prev_price.abs_diff(curr_price), prev_price, 0)
}

/// `now * 10000 / before`; full (10000) when `before == 0`.
pub fn calculate_liquidity_remaining(liquidity_before: u64, liquidity_now: u64) -> u64 {
    ratio_bps(liquidity_now, liquidity_before, FULL_LIQUIDITY_BPS)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CrisisOracle {
    thresholds: OracleThresholds,
}

impl CrisisOracle {
    pub fn new(thresholds: OracleThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &OracleThresholds {
        &self.thresholds
    }

    pub fn detect(
        &self,
        prev_price: u64,
        curr_price: u64,
        liquidity_before: u64,
        liquidity_now: u64,
        spread_bps: u64,
        timestamp: u64,
    ) -> CrisisDetectionResult {
        let metrics = Metrics {
            volatility_bps: calculate_volatility(prev_price, curr_price),
            liquidity_remaining_bps: calculate_liquidity_remaining(liquidity_before, liquidity_now),
            spread_bps,
        };
        let fired: Vec<TriggerType> = CRISIS_CHECKS
            .iter()
            .filter(|(_, check)| check(&metrics, &self.thresholds))
            .map(|(kind, _)| *kind)
            .collect();

        CrisisDetectionResult {
            is_crisis: !fired.is_empty(),
            trigger_type: fired.first().copied().unwrap_or(TriggerType::None),
            volatility_bps: metrics.volatility_bps,
            liquidity_remaining_bps: metrics.liquidity_remaining_bps,
            avg_spread_bps: spread_bps,
            timestamp,
            fired,
        }
    }

    /// All of: volatility, liquidity and spread back inside the calm band.
    pub fn check_stabilization(&self, volatility_bps: u64, liquidity_bps: u64, spread_bps: u64) -> bool {
        volatility_bps < self.thresholds.stable_vol_bps
            && liquidity_bps > self.thresholds.stable_liquidity_bps
            && spread_bps < self.thresholds.stable_spread_bps
    }

    pub fn check_liquidity_drain(&self, prev_liquidity: u64, curr_liquidity: u64) -> bool {
        if prev_liquidity == 0 {
            return false;
        }
        calculate_liquidity_remaining(prev_liquidity, curr_liquidity) < self.thresholds.crisis_liquidity_bps
    }
}

/// Detection with the default thresholds.
pub fn detect_crisis(
    prev_price: u64,
    curr_price: u64,
    liquidity_before: u64,
    liquidity_now: u64,
    spread_bps: u64,
    timestamp: u64,
) -> CrisisDetectionResult {
    CrisisOracle::default().detect(prev_price, curr_price, liquidity_before, liquidity_now, spread_bps, timestamp)
}

// =============================================================================
// Crisis latch
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatchState {
    Calm,
    Crisis,
}

/// Caller-owned hysteresis over successive detections. Any detection latches
/// `Crisis`; only `calm_required` consecutive stabilized observations release it.
#[derive(Debug, Clone)]
pub struct CrisisLatch {
    pub state: LatchState,
    pub calm_streak: u32,
    pub calm_required: u32,
}

impl CrisisLatch {
    pub fn new(calm_required: u32) -> Self {
        Self {
            state: LatchState::Calm,
            calm_streak: 0,
            calm_required: calm_required.max(1),
        }
    }

    pub fn observe(&mut self, oracle: &CrisisOracle, result: &CrisisDetectionResult) -> LatchState {
        if result.is_crisis {
            self.state = LatchState::Crisis;
            self.calm_streak = 0;
            return self.state;
        }
        if self.state == LatchState::Crisis {
            let stable = oracle.check_stabilization(
                result.volatility_bps,
                result.liquidity_remaining_bps,
                result.avg_spread_bps,
            );
            if stable {
                self.calm_streak += 1;
                if self.calm_streak >= self.calm_required {
                    self.state = LatchState::Calm;
                    self.calm_streak = 0;
                }
            } else {
                self.calm_streak = 0;
            }
        }
        self.state
    }

    pub fn in_crisis(&self) -> bool {
        matches!(self.state, LatchState::Crisis)
    }
}
