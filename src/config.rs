use crate::virtual_value::ExecutionContext;

/// Protocol parameters for every component of the mechanism.
///
/// `Config::from_env()` overlays environment variables on the defaults;
/// `Config::default()` ignores the environment entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub context: ExecutionContext,
    pub epsilon: f64,
    /// λ for the commit-side adverse-selection penalty.
    pub adverse_lambda: f64,
    /// λ for the exit-side crisis-cost term.
    pub crisis_lambda: f64,
    /// Penalty multiplier for the approximate valuation.
    pub approx_penalty_param: f64,
    pub bisection_iterations: u32,
    pub bisection_tolerance: f64,
    pub simpson_segments: u32,
    pub unit_step: f64,
    pub max_slash_fraction: f64,
    pub credibility_weight: f64,
    pub base_spread_bps: f64,
    pub spread_adverse_param: f64,
    pub cap_martyr_bps: f64,
    pub cap_citizen_bps: f64,
    pub crisis_vol_bps: u64,
    pub crisis_liquidity_bps: u64,
    pub crisis_spread_bps: u64,
    pub stable_vol_bps: u64,
    pub stable_liquidity_bps: u64,
    pub stable_spread_bps: u64,
    /// Consecutive stabilized observations before the crisis latch releases.
    pub calm_required: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: ExecutionContext::Precise,
            epsilon: 1e-9,
            adverse_lambda: 0.5,
            crisis_lambda: 0.5,
            approx_penalty_param: 0.5,
            bisection_iterations: 100,
            bisection_tolerance: 1e-6,
            simpson_segments: 100,
            unit_step: 1.0,
            max_slash_fraction: 0.3,
            credibility_weight: 0.7,
            base_spread_bps: 10.0,
            spread_adverse_param: 0.5,
            cap_martyr_bps: 50.0,
            cap_citizen_bps: 200.0,
            crisis_vol_bps: 3000,
            crisis_liquidity_bps: 6000,
            crisis_spread_bps: 1000,
            stable_vol_bps: 2000,
            stable_liquidity_bps: 7000,
            stable_spread_bps: 500,
            calm_required: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            context: std::env::var("VV_CONTEXT").ok().and_then(|v| ExecutionContext::parse(&v)).unwrap_or(d.context),
            epsilon: std::env::var("VV_EPSILON").ok().and_then(|v| v.parse().ok()).unwrap_or(d.epsilon),
            adverse_lambda: std::env::var("ADVERSE_LAMBDA").ok().and_then(|v| v.parse().ok()).unwrap_or(d.adverse_lambda),
            crisis_lambda: std::env::var("CRISIS_LAMBDA").ok().and_then(|v| v.parse().ok()).unwrap_or(d.crisis_lambda),
            approx_penalty_param: std::env::var("APPROX_PENALTY").ok().and_then(|v| v.parse().ok()).unwrap_or(d.approx_penalty_param),
            bisection_iterations: std::env::var("BISECT_ITERS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.bisection_iterations),
            bisection_tolerance: std::env::var("BISECT_TOL").ok().and_then(|v| v.parse().ok()).unwrap_or(d.bisection_tolerance),
            simpson_segments: std::env::var("SIMPSON_SEGMENTS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.simpson_segments),
            unit_step: std::env::var("UNIT_STEP").ok().and_then(|v| v.parse().ok()).unwrap_or(d.unit_step),
            max_slash_fraction: std::env::var("MAX_SLASH_FRACTION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.max_slash_fraction),
            credibility_weight: std::env::var("CREDIBILITY_WEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.credibility_weight),
            base_spread_bps: std::env::var("BASE_SPREAD_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.base_spread_bps),
            spread_adverse_param: std::env::var("SPREAD_ADVERSE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.spread_adverse_param),
            cap_martyr_bps: std::env::var("CAP_MARTYR_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.cap_martyr_bps),
            cap_citizen_bps: std::env::var("CAP_CITIZEN_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.cap_citizen_bps),
            crisis_vol_bps: std::env::var("CRISIS_VOL_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.crisis_vol_bps),
            crisis_liquidity_bps: std::env::var("CRISIS_LIQ_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.crisis_liquidity_bps),
            crisis_spread_bps: std::env::var("CRISIS_SPREAD_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.crisis_spread_bps),
            stable_vol_bps: std::env::var("STABLE_VOL_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.stable_vol_bps),
            stable_liquidity_bps: std::env::var("STABLE_LIQ_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.stable_liquidity_bps),
            stable_spread_bps: std::env::var("STABLE_SPREAD_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.stable_spread_bps),
            calm_required: std::env::var("CALM_REQUIRED").ok().and_then(|v| v.parse().ok()).unwrap_or(d.calm_required),
        }
    }

    /// Stable digest of the parameter set, for audit records.
    pub fn params_hash(&self) -> String {
        crate::logging::params_hash(&format!("{:?}", self))
    }
}
