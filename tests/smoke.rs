//! Smoke tests: end-to-end checks that the mechanism's published guarantees
//! hold on realistic inputs, through the public API only.

use std::io::Write;
use std::sync::Arc;
use std::thread;

use myerson_mm::boundary::{allocate_tier, TierBoundaries, TierBoundarySolver, TierDecision};
use myerson_mm::config::Config;
use myerson_mm::distribution::{load_scores, PerformanceDistribution};
use myerson_mm::oracle::{calculate_volatility, detect_crisis, CrisisLatch, CrisisOracle, LatchState, TriggerType};
use myerson_mm::reward::{Integration, RewardIntegrator};
use myerson_mm::router::{MarketMakerRef, SmartRouter};
use myerson_mm::slashing::{update_credibility, SlashingEngine};
use myerson_mm::snapshot::{InMemorySnapshotStore, SnapshotSource};
use myerson_mm::tier::Tier;
use myerson_mm::virtual_value::{compute_virtual_value, ApproximateStrategy, ExecutionContext, PreciseStrategy};
use myerson_mm::Mechanism;

fn reference_summary() -> PerformanceDistribution {
    PerformanceDistribution::from_summary(90.0, 5.0, 75.0, 100.0, 0, 1).unwrap()
}

/// Deterministic, roughly bell-shaped score history on [0, 100].
fn score_history(n: usize, epoch: u64) -> PerformanceDistribution {
    let scores: Vec<f64> = (0..n)
        .map(|i| {
            let u = (i as f64 + 0.5) / n as f64;
            let t = if u < 0.5 { (2.0 * u).sqrt() - 1.0 } else { 1.0 - (2.0 * (1.0 - u)).sqrt() };
            50.0 + 50.0 * t
        })
        .collect();
    PerformanceDistribution::from_samples(scores, epoch).unwrap()
}

#[test]
fn allocation_follows_solved_boundaries() {
    let d = score_history(400, 1);
    let b = TierBoundarySolver::new(PreciseStrategy::default()).solve(&d).unwrap();
    assert!(b.valid);

    assert_eq!(allocate_tier(b.upper_root, &b), TierDecision::Martyr);
    let mut score = d.min;
    while score <= d.max {
        let expected = if score >= b.upper_root {
            TierDecision::Martyr
        } else if score <= b.lower_root {
            TierDecision::Sovereign
        } else {
            TierDecision::Reject
        };
        assert_eq!(allocate_tier(score, &b), expected, "score={}", score);
        score += 0.25;
    }
}

#[test]
fn exact_ties_resolve_to_assignment() {
    let b = TierBoundaries::new(91.5, 82.0, 2);
    assert_eq!(allocate_tier(91.5, &b), TierDecision::Martyr);
    assert_eq!(allocate_tier(82.0, &b), TierDecision::Sovereign);
    assert_eq!(allocate_tier(86.0, &b), TierDecision::Reject);
}

#[test]
fn rewards_are_monotone_on_reference_distribution() {
    let d = reference_summary();
    let cfg = Config::default();
    for context in [ExecutionContext::Precise, ExecutionContext::Approximate] {
        // Summary-only snapshot: both integrations run over the approximate value.
        let integrator = RewardIntegrator::new(ApproximateStrategy::default(), Integration::for_context(context, &cfg));
        let r80 = integrator.cumulative_reward(80.0, &d).unwrap();
        let r90 = integrator.cumulative_reward(90.0, &d).unwrap();
        let r95 = integrator.cumulative_reward(95.0, &d).unwrap();
        assert!(r80 <= r90 && r90 <= r95, "{:?}: {} {} {}", context, r80, r90, r95);
    }
}

#[test]
fn slashing_bounds() {
    let d = reference_summary();
    let engine = SlashingEngine::new(ApproximateStrategy::default(), 0.3).unwrap();
    for (claimed, verified) in [(80.0, 80.0), (80.0, 95.0), (75.0, 100.0)] {
        assert_eq!(engine.compute(claimed, verified, &d).unwrap().slash_amount, 0.0);
    }
    for (claimed, verified) in [(90.2, 90.0), (81.0, 80.0), (100.0, 75.0)] {
        let slash = engine.compute(claimed, verified, &d).unwrap().slash_amount;
        assert!(slash > 0.0 && slash <= 0.3, "claimed={} slash={}", claimed, slash);
    }
}

#[test]
fn oracle_reference_cases() {
    assert_eq!(calculate_volatility(1000, 1300), 3000);
    assert_eq!(calculate_volatility(0, 1000), 0);

    let r = detect_crisis(1000, 600, 10_000, 10_000, 50, 1_700_000_000);
    assert!(r.is_crisis);
    assert_eq!(r.trigger_type, TriggerType::Volatility);
    assert_eq!(r.volatility_bps, 4000);

    let r = detect_crisis(1000, 1000, 10_000, 4000, 50, 1_700_000_000);
    assert_eq!(r.trigger_type, TriggerType::Liquidity);
}

#[test]
fn routing_reference_cases() {
    let router = SmartRouter::default();
    let mms = vec![
        MarketMakerRef::new("sov", Tier::Sovereign),
        MarketMakerRef::new("mar", Tier::Martyr),
        MarketMakerRef::new("cit", Tier::Citizen),
    ];
    let crisis = router.route(1000, true, &mms);
    assert_eq!(crisis[0].market_maker_id, "mar");
    assert_eq!(crisis[0].allocated_quantity, 1000);
    assert_eq!(crisis[0].priority, 100);

    let normal = router.route(1000, false, &mms[..2]);
    assert_eq!(normal.len(), 2);
    assert!(normal.iter().all(|d| d.allocated_quantity == 500));
}

#[test]
fn credibility_reference_case() {
    assert!((update_credibility(500.0, 1000.0, 0.7).unwrap() - 850.0).abs() < 1e-9);
}

#[test]
fn virtual_value_is_pure_across_threads() {
    let d = Arc::new(score_history(500, 3));
    let reference = compute_virtual_value(61.7, &d, &PreciseStrategy::default()).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let d = Arc::clone(&d);
            thread::spawn(move || compute_virtual_value(61.7, &d, &PreciseStrategy::default()).unwrap())
        })
        .collect();
    for h in handles {
        let vv = h.join().unwrap();
        assert_eq!(vv.virtual_value.to_bits(), reference.virtual_value.to_bits());
        assert_eq!(vv.information_rent.to_bits(), reference.information_rent.to_bits());
    }
}

#[test]
fn crisis_latch_holds_until_market_settles() {
    let oracle = CrisisOracle::default();
    let mut latch = CrisisLatch::new(3);
    let shocks = [
        (1000, 600, 10_000, 10_000, 50),
        (600, 610, 10_000, 9_000, 700),
        (610, 612, 10_000, 9_500, 100),
        (612, 615, 10_000, 9_800, 80),
        (615, 616, 10_000, 9_900, 60),
    ];
    let states: Vec<LatchState> = shocks
        .iter()
        .enumerate()
        .map(|(t, &(p, c, lb, ln, s))| latch.observe(&oracle, &oracle.detect(p, c, lb, ln, s, t as u64)))
        .collect();
    assert_eq!(
        states,
        vec![
            LatchState::Crisis,
            LatchState::Crisis,
            LatchState::Crisis,
            LatchState::Crisis,
            LatchState::Calm
        ]
    );
}

#[test]
fn end_to_end_from_score_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "score").unwrap();
    let d = score_history(300, 9);
    for s in d.samples() {
        writeln!(file, "{}", s).unwrap();
    }
    file.flush().unwrap();

    let scores = load_scores(file.path()).unwrap();
    assert_eq!(scores.len(), 300);
    let dist = PerformanceDistribution::from_samples(scores, 9).unwrap();

    let mechanism = Mechanism::new(Config::default()).unwrap();
    let store = InMemorySnapshotStore::new(dist);
    let boundaries = mechanism.solve_and_publish(&store).unwrap();
    let snapshot = store.current();
    assert_eq!(snapshot.boundaries, boundaries);

    let strong = mechanism.evaluate("mm-strong", 97.0, &snapshot).unwrap();
    let weak = mechanism.evaluate("mm-weak", 20.0, &snapshot).unwrap();
    assert_eq!(strong.decision, TierDecision::Martyr);
    assert!(strong.cumulative_reward >= weak.cumulative_reward);

    // Republishing the same epoch is refused.
    assert!(mechanism.solve_and_publish(&store).is_err());
}
