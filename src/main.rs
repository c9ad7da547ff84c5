//! One-shot evaluation run: load an epoch's scores, solve the tier
//! boundaries, then evaluate, check the market and route one order.
//!
//! Inputs come from the environment:
//!   SCORES_PATH  newline/comma separated historical scores (required)
//!   EPOCH        epoch number for the snapshot (default 1)
//!   MM_ID, MM_SCORE, CLAIMED_SCORE
//!   MARKET       prev_price,curr_price,liquidity_before,liquidity_now,spread_bps
//!   ORDER_QTY, MMS ("id:tier,id:tier")

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;

use myerson_mm::config::Config;
use myerson_mm::distribution::{load_scores, PerformanceDistribution};
use myerson_mm::logging::{self, log_session_summary, obj, v_str, Domain, Level};
use myerson_mm::router::MarketMakerRef;
use myerson_mm::snapshot::{InMemorySnapshotStore, SnapshotSource};
use myerson_mm::tier::Tier;
use myerson_mm::Mechanism;

fn parse_mms(raw: &str) -> Result<Vec<MarketMakerRef>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|entry| {
            let (id, tier) = entry
                .split_once(':')
                .ok_or_else(|| anyhow!("MMS entry '{}' is not id:tier", entry))?;
            let tier = Tier::parse(tier).ok_or_else(|| anyhow!("unknown tier '{}'", tier))?;
            Ok(MarketMakerRef::new(id.trim(), tier))
        })
        .collect()
}

fn parse_market(raw: &str) -> Result<[u64; 5]> {
    let values: Vec<u64> = raw
        .split(',')
        .map(|v| v.trim().parse::<u64>().with_context(|| format!("bad MARKET value '{}'", v)))
        .collect::<Result<_>>()?;
    values
        .try_into()
        .map_err(|v: Vec<u64>| anyhow!("MARKET needs 5 values, got {}", v.len()))
}

fn main() -> Result<()> {
    let started = Instant::now();
    let cfg = Config::from_env();
    let mechanism = Mechanism::new(cfg)?;

    let path = std::env::var("SCORES_PATH")
        .map(PathBuf::from)
        .context("SCORES_PATH must point at a score list")?;
    let epoch = std::env::var("EPOCH").ok().and_then(|v| v.parse().ok()).unwrap_or(1u64);
    let scores = load_scores(&path).with_context(|| format!("loading {}", path.display()))?;
    let dist = PerformanceDistribution::from_samples(scores, epoch)?;
    logging::log(
        Level::Info,
        Domain::System,
        "scores_loaded",
        obj(&[
            ("path", v_str(&path.to_string_lossy())),
            ("digest", v_str(&dist.digest())),
        ]),
    );

    let store = InMemorySnapshotStore::new(dist);
    mechanism.solve_and_publish(&store)?;
    let snapshot = store.current();

    let mut evaluations = 0u64;
    let mut slashes = 0u64;
    let mm_id = std::env::var("MM_ID").unwrap_or_else(|_| "mm-0".to_string());
    if let Some(score) = std::env::var("MM_SCORE").ok().and_then(|v| v.parse::<f64>().ok()) {
        mechanism.evaluate(&mm_id, score, &snapshot)?;
        evaluations += 1;

        if let Some(claimed) = std::env::var("CLAIMED_SCORE").ok().and_then(|v| v.parse::<f64>().ok()) {
            let outcome = mechanism.slash(&mm_id, claimed, score, &snapshot.distribution)?;
            if outcome.slash_amount > 0.0 {
                slashes += 1;
            }
        }
    }

    let mut crises = 0u64;
    if let Ok(raw) = std::env::var("MARKET") {
        let [prev, curr, liq_before, liq_now, spread] = parse_market(&raw)?;
        let ts = Utc::now().timestamp() as u64;
        let result = mechanism.detect_crisis(prev, curr, liq_before, liq_now, spread, ts);
        if result.is_crisis {
            crises += 1;
        }

        if let Ok(raw) = std::env::var("MMS") {
            let mms = parse_mms(&raw)?;
            let qty = std::env::var("ORDER_QTY").ok().and_then(|v| v.parse().ok()).unwrap_or(1000u64);
            mechanism.route(qty, result.is_crisis, &mms);
        }
    }

    log_session_summary(started.elapsed().as_millis() as u64, evaluations, crises, slashes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mms() {
        let mms = parse_mms("a:martyr, b:sovereign").unwrap();
        assert_eq!(mms.len(), 2);
        assert_eq!(mms[1].tier, Tier::Sovereign);
        assert!(parse_mms("a").is_err());
        assert!(parse_mms("a:king").is_err());
    }

    #[test]
    fn test_parse_market() {
        assert_eq!(parse_market("1000,600,10000,9000,50").unwrap(), [1000, 600, 10_000, 9000, 50]);
        assert!(parse_market("1,2,3").is_err());
        assert!(parse_market("1,2,3,4,x").is_err());
    }
}
