//! Config-bound entry point wiring the components together.
//!
//! The components themselves are pure; this is where decisions get logged
//! and audit hashes are emitted so a ledger can recompute any output from
//! its inputs and the parameter hash.

use serde::Serialize;
use serde_json::json;

use crate::boundary::{allocate_tier, TierBoundaries, TierBoundarySolver, TierDecision};
use crate::config::Config;
use crate::distribution::PerformanceDistribution;
use crate::error::Result;
use crate::logging::{self, hash_json, log_audit, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::oracle::{CrisisDetectionResult, CrisisLatch, CrisisOracle, OracleThresholds};
use crate::reward::{Integration, RewardIntegrator};
use crate::router::{MarketMakerRef, RoutingDecision, SmartRouter};
use crate::slashing::{CredibilityUpdater, SlashOutcome, SlashingEngine};
use crate::snapshot::{MechanismSnapshot, SnapshotSource};
use crate::spread::{CrisisSpreadBreakdown, CrisisSpreadCalculator, SpreadInputs};
use crate::tier::Tier;
use crate::virtual_value::{
    compute_virtual_value, ValuationStrategy, VirtualValueBreakdown, VirtualValueStrategy,
};

/// Everything decided about one market maker's score in one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub market_maker_id: String,
    pub epoch: u64,
    pub decision: TierDecision,
    pub virtual_value: VirtualValueBreakdown,
    pub cumulative_reward: f64,
}

pub struct Mechanism {
    cfg: Config,
    params_hash: String,
    strategy: ValuationStrategy,
    solver: TierBoundarySolver<ValuationStrategy>,
    rewards: RewardIntegrator<ValuationStrategy>,
    slashing: SlashingEngine<ValuationStrategy>,
    credibility: CredibilityUpdater,
    spread: CrisisSpreadCalculator,
    oracle: CrisisOracle,
    router: SmartRouter,
}

impl Mechanism {
    pub fn new(cfg: Config) -> Result<Self> {
        let strategy = ValuationStrategy::from_config(&cfg);
        let integration = Integration::for_context(strategy.context(), &cfg);
        let mechanism = Self {
            params_hash: cfg.params_hash(),
            strategy,
            solver: TierBoundarySolver::new(strategy)
                .with_limits(cfg.bisection_iterations, cfg.bisection_tolerance),
            rewards: RewardIntegrator::new(strategy, integration),
            slashing: SlashingEngine::new(strategy, cfg.max_slash_fraction)?,
            credibility: CredibilityUpdater::new(cfg.credibility_weight)?,
            spread: CrisisSpreadCalculator::from_config(&cfg),
            oracle: CrisisOracle::new(OracleThresholds::from_config(&cfg))?,
            router: SmartRouter::default(),
            cfg,
        };
        logging::log(
            Level::Info,
            Domain::System,
            "mechanism_ready",
            obj(&[
                ("context", v_str(mechanism.strategy.name())),
                ("params_hash", v_str(&mechanism.params_hash)),
            ]),
        );
        Ok(mechanism)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn params_hash(&self) -> &str {
        &self.params_hash
    }

    pub fn strategy(&self) -> &ValuationStrategy {
        &self.strategy
    }

    pub fn oracle(&self) -> &CrisisOracle {
        &self.oracle
    }

    pub fn new_latch(&self) -> CrisisLatch {
        CrisisLatch::new(self.cfg.calm_required)
    }

    pub fn solve(&self, dist: &PerformanceDistribution) -> Result<TierBoundaries> {
        let _p = ProfileScope::with_context("solve_boundaries", &[("epoch", json!(dist.epoch))]);
        let report = self.solver.solve_with_report(dist)?;
        logging::log_boundaries(&report.boundaries, (report.upper_iterations, report.lower_iterations));
        log_audit(
            "boundaries",
            &self.params_hash,
            &dist.digest(),
            &hash_json(&report.boundaries),
        );
        Ok(report.boundaries)
    }

    /// Solves against the store's current distribution and publishes the
    /// result under that distribution's epoch.
    pub fn solve_and_publish(&self, store: &dyn SnapshotSource) -> Result<TierBoundaries> {
        let snapshot = store.current();
        let boundaries = self.solve(&snapshot.distribution)?;
        store.publish_boundaries(boundaries.upper_root, boundaries.lower_root, boundaries.epoch)?;
        Ok(boundaries)
    }

    pub fn assign(&self, market_maker_id: &str, score: f64, boundaries: &TierBoundaries) -> TierDecision {
        let decision = allocate_tier(score, boundaries);
        logging::log_tier_decision(market_maker_id, score, decision.as_str());
        decision
    }

    pub fn evaluate(&self, market_maker_id: &str, score: f64, snapshot: &MechanismSnapshot) -> Result<Evaluation> {
        let dist = snapshot.distribution.as_ref();
        let decision = self.assign(market_maker_id, score, &snapshot.boundaries);
        let virtual_value = compute_virtual_value(score, dist, &self.strategy)?;
        let cumulative_reward = self.rewards.cumulative_reward(score, dist)?;

        let evaluation = Evaluation {
            market_maker_id: market_maker_id.to_string(),
            epoch: snapshot.epoch(),
            decision,
            virtual_value,
            cumulative_reward,
        };
        logging::log(
            Level::Info,
            Domain::Reward,
            "evaluated",
            obj(&[
                ("market_maker_id", v_str(market_maker_id)),
                ("epoch", json!(evaluation.epoch)),
                ("score", v_num(score)),
                ("virtual_value", v_num(virtual_value.virtual_value)),
                ("cumulative_reward", v_num(cumulative_reward)),
                ("decision", v_str(decision.as_str())),
            ]),
        );
        log_audit(
            "evaluation",
            &self.params_hash,
            &hash_json(&json!({ "score": score, "distribution": dist.digest() })),
            &hash_json(&evaluation),
        );
        Ok(evaluation)
    }

    pub fn slash(
        &self,
        market_maker_id: &str,
        claimed_score: f64,
        verified_score: f64,
        dist: &PerformanceDistribution,
    ) -> Result<SlashOutcome> {
        let outcome = self.slashing.compute(claimed_score, verified_score, dist)?;
        logging::log_slash(market_maker_id, &outcome);
        Ok(outcome)
    }

    pub fn update_credibility(&self, prior: f64, proof_outcome: f64) -> Result<f64> {
        self.credibility.update(prior, proof_outcome)
    }

    pub fn crisis_spread(&self, inputs: &SpreadInputs, tier: Option<Tier>) -> Result<CrisisSpreadBreakdown> {
        let breakdown = self.spread.compute(inputs, tier)?;
        logging::log(
            Level::Debug,
            Domain::Spread,
            "spread",
            obj(&[
                ("tier", v_str(tier.map(|t| t.as_str()).unwrap_or("none"))),
                ("total_spread", v_num(breakdown.total_spread)),
                ("monopoly", v_num(breakdown.monopoly_component)),
                ("adverse_selection", v_num(breakdown.adverse_selection_component)),
                ("capped", json!(breakdown.capped)),
            ]),
        );
        Ok(breakdown)
    }

    pub fn detect_crisis(
        &self,
        prev_price: u64,
        curr_price: u64,
        liquidity_before: u64,
        liquidity_now: u64,
        spread_bps: u64,
        timestamp: u64,
    ) -> CrisisDetectionResult {
        let result = self
            .oracle
            .detect(prev_price, curr_price, liquidity_before, liquidity_now, spread_bps, timestamp);
        logging::log_crisis(&result);
        result
    }

    pub fn route(&self, order_quantity: u64, is_crisis: bool, mms: &[MarketMakerRef]) -> Vec<RoutingDecision> {
        let decisions = self.router.route(order_quantity, is_crisis, mms);
        logging::log_routing(order_quantity, is_crisis, &decisions);
        decisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::InMemorySnapshotStore;
    use crate::virtual_value::ExecutionContext;

    fn approx_mechanism() -> Mechanism {
        let cfg = Config {
            context: ExecutionContext::Approximate,
            ..Config::default()
        };
        Mechanism::new(cfg).unwrap()
    }

    fn wide_samples(epoch: u64) -> PerformanceDistribution {
        let scores: Vec<f64> = (0..300)
            .map(|i| {
                let u = (i as f64 + 0.5) / 300.0;
                let t = if u < 0.5 { (2.0 * u).sqrt() - 1.0 } else { 1.0 - (2.0 * (1.0 - u)).sqrt() };
                50.0 + 50.0 * t
            })
            .collect();
        PerformanceDistribution::from_samples(scores, epoch).unwrap()
    }

    #[test]
    fn test_bad_config_rejected() {
        let cfg = Config {
            max_slash_fraction: 1.5,
            ..Config::default()
        };
        assert!(Mechanism::new(cfg).is_err());
        let cfg = Config {
            stable_vol_bps: 4000,
            ..Config::default()
        };
        assert!(Mechanism::new(cfg).is_err());
    }

    #[test]
    fn test_solve_publish_evaluate() {
        let mech = Mechanism::new(Config::default()).unwrap();
        let store = InMemorySnapshotStore::new(wide_samples(3));
        let b = mech.solve_and_publish(&store).unwrap();
        let snap = store.current();
        assert!(snap.boundaries.valid);
        assert_eq!(snap.boundaries, b);

        let top = mech.evaluate("mm-top", 99.0, &snap).unwrap();
        assert_eq!(top.decision, TierDecision::Martyr);
        assert_eq!(top.epoch, 3);
        assert!(top.cumulative_reward > 0.0);
        let bottom = mech.evaluate("mm-low", 1.0, &snap).unwrap();
        assert!(bottom.cumulative_reward <= top.cumulative_reward);
    }

    #[test]
    fn test_unsolved_snapshot_rejects_everyone() {
        let mech = approx_mechanism();
        let store = InMemorySnapshotStore::new(wide_samples(1));
        let e = mech.evaluate("mm", 99.0, &store.current()).unwrap();
        assert_eq!(e.decision, TierDecision::Reject);
    }

    #[test]
    fn test_context_pairs_integration() {
        let mech = approx_mechanism();
        assert_eq!(mech.rewards.integration(), Integration::UnitStep { step: 1.0 });
        let mech = Mechanism::new(Config::default()).unwrap();
        assert_eq!(mech.rewards.integration(), Integration::Simpson { segments: 100 });
    }

    #[test]
    fn test_crisis_flow() {
        let mech = approx_mechanism();
        let r = mech.detect_crisis(1000, 600, 10_000, 10_000, 50, 7);
        assert!(r.is_crisis);
        let mms = vec![
            MarketMakerRef::new("s", Tier::Sovereign),
            MarketMakerRef::new("m", Tier::Martyr),
        ];
        let routed = mech.route(500, r.is_crisis, &mms);
        assert_eq!(routed[0].market_maker_id, "m");
        assert_eq!(routed[0].allocated_quantity, 500);

        let inputs = SpreadInputs {
            base_price: 1000.0,
            current_vol: 1.0,
            normal_vol: 0.01,
            info_advantage: 0.5,
            risk_aversion: 1.0,
        };
        assert!(mech.crisis_spread(&inputs, Some(Tier::Martyr)).unwrap().capped);
    }

    #[test]
    fn test_route_wraps_pure_router() {
        let mech = approx_mechanism();
        let mms = vec![
            MarketMakerRef::new("c", Tier::Citizen),
            MarketMakerRef::new("m", Tier::Martyr),
            MarketMakerRef::new("s", Tier::Sovereign),
        ];
        for crisis in [true, false] {
            assert_eq!(mech.route(1001, crisis, &mms), SmartRouter::default().route(1001, crisis, &mms));
        }
    }

    #[test]
    fn test_slash_and_credibility() {
        let mech = approx_mechanism();
        let d = PerformanceDistribution::from_summary(90.0, 5.0, 75.0, 100.0, 0, 1).unwrap();
        let out = mech.slash("mm", 99.0, 80.0, &d).unwrap();
        assert_eq!(out.slash_amount, 0.3);
        assert!((mech.update_credibility(500.0, 1000.0).unwrap() - 850.0).abs() < 1e-9);
    }
}
