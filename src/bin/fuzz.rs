//! Seeded invariant sweep. Prints one JSON line per violation and a
//! summary line; exits non-zero if anything was violated.

use std::env;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;

use myerson_mm::boundary::{allocate_tier, TierBoundarySolver, TierDecision};
use myerson_mm::config::Config;
use myerson_mm::distribution::PerformanceDistribution;
use myerson_mm::oracle::{CrisisOracle, TriggerType};
use myerson_mm::reward::{Integration, RewardIntegrator};
use myerson_mm::router::{MarketMakerRef, SmartRouter};
use myerson_mm::slashing::SlashingEngine;
use myerson_mm::tier::Tier;
use myerson_mm::virtual_value::{ApproximateStrategy, PreciseStrategy, ValuationStrategy};

fn random_distribution(rng: &mut StdRng, epoch: u64) -> Option<PerformanceDistribution> {
    let center: f64 = rng.gen_range(10.0..90.0);
    let width: f64 = rng.gen_range(0.5..40.0);
    let n = rng.gen_range(5..300);
    let scores: Vec<f64> = (0..n).map(|_| center + width * (rng.gen::<f64>() - rng.gen::<f64>())).collect();
    PerformanceDistribution::from_samples(scores, epoch).ok()
}

fn violation(case: u64, check: &str, detail: serde_json::Value) {
    println!("{}", json!({"type": "violation", "case": case, "check": check, "detail": detail}));
}

fn main() {
    let seed = env::var("SEED").ok().and_then(|v| v.parse().ok()).unwrap_or(42u64);
    let cases = env::var("EVENTS").ok().and_then(|v| v.parse().ok()).unwrap_or(200u64);
    let mut rng = StdRng::seed_from_u64(seed);
    let cfg = Config::default();
    let oracle = CrisisOracle::default();
    let router = SmartRouter::default();
    let mut violations = 0u64;

    for case in 0..cases {
        let Some(dist) = random_distribution(&mut rng, case) else {
            continue;
        };
        let strategy = if rng.gen_bool(0.5) {
            ValuationStrategy::Precise(PreciseStrategy::from_config(&cfg))
        } else {
            ValuationStrategy::Approximate(ApproximateStrategy::from_config(&cfg))
        };

        // Boundaries: non-negative gap, inclusive ties.
        if let Ok(b) = TierBoundarySolver::new(strategy).solve(&dist) {
            if b.gap_width < 0.0 {
                violations += 1;
                violation(case, "gap_width", json!({"gap": b.gap_width}));
            }
            if allocate_tier(b.upper_root, &b) != TierDecision::Martyr {
                violations += 1;
                violation(case, "upper_tie", json!({"upper": b.upper_root}));
            }
            if b.lower_root < b.upper_root && allocate_tier(b.lower_root, &b) != TierDecision::Sovereign {
                violations += 1;
                violation(case, "lower_tie", json!({"lower": b.lower_root}));
            }
        }

        // Rewards never decrease with score.
        let rewards = RewardIntegrator::new(strategy, Integration::for_context(strategy.context(), &cfg));
        let mut prev = 0.0;
        for k in 0..=8 {
            let score = dist.min + (dist.max - dist.min) * k as f64 / 8.0;
            if let Ok(r) = rewards.cumulative_reward(score, &dist) {
                if r + 1e-9 < prev {
                    violations += 1;
                    violation(case, "reward_monotone", json!({"score": score, "reward": r, "prev": prev}));
                }
                prev = r;
            }
        }

        // Slash bounded by the cap.
        if let Ok(engine) = SlashingEngine::new(strategy, cfg.max_slash_fraction) {
            let claimed = rng.gen_range(dist.min..=dist.max);
            let verified = rng.gen_range(dist.min..=dist.max);
            if let Ok(out) = engine.compute(claimed, verified, &dist) {
                if out.slash_amount < 0.0 || out.slash_amount > cfg.max_slash_fraction {
                    violations += 1;
                    violation(case, "slash_bounds", json!({"slash": out.slash_amount}));
                }
            }
        }

        // Oracle: flag agrees with the fired list, first fired wins.
        let r = oracle.detect(
            rng.gen_range(0..2000),
            rng.gen_range(0..2000),
            rng.gen_range(0..20_000),
            rng.gen_range(0..20_000),
            rng.gen_range(0..2000),
            case,
        );
        let expected_trigger = r.fired.first().copied().unwrap_or(TriggerType::None);
        if r.is_crisis == r.fired.is_empty() || r.trigger_type != expected_trigger {
            violations += 1;
            violation(case, "oracle_order", json!({"trigger": r.trigger_type.as_str(), "fired": r.fired.len()}));
        }

        // Router never allocates more than the order.
        let mms: Vec<MarketMakerRef> = (0..rng.gen_range(0..8))
            .map(|i| MarketMakerRef::new(format!("mm-{}", i), Tier::CASCADE[rng.gen_range(0..3)]))
            .collect();
        let qty: u64 = rng.gen_range(0..100_000);
        let allocated: u64 = router.route(qty, r.is_crisis, &mms).iter().map(|d| d.allocated_quantity).sum();
        if allocated > qty {
            violations += 1;
            violation(case, "router_conservation", json!({"qty": qty, "allocated": allocated}));
        }
    }

    println!("{}", json!({"type": "summary", "seed": seed, "cases": cases, "violations": violations}));
    if violations > 0 {
        std::process::exit(1);
    }
}
