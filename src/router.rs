//! Order-flow allocation across market makers.
//!
//! Normal mode splits the order evenly and ranks makers informationally.
//! Crisis mode runs a waterfall down the tier cascade so the makers who
//! committed to quote through a crisis are filled first.

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketMakerRef {
    pub id: String,
    pub tier: Tier,
}

impl MarketMakerRef {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self { id: id.into(), tier }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub market_maker_id: String,
    pub tier: Tier,
    pub priority: u32,
    pub allocated_quantity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityTable {
    pub martyr: u32,
    pub citizen: u32,
    pub sovereign: u32,
}

impl PriorityTable {
    /// Informational ranking only; allocation ignores it in normal mode.
    pub const NORMAL: PriorityTable = PriorityTable {
        martyr: 50,
        citizen: 20,
        sovereign: 10,
    };

    pub const CRISIS: PriorityTable = PriorityTable {
        martyr: 100,
        citizen: 30,
        sovereign: 5,
    };

    pub fn priority(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Martyr => self.martyr,
            Tier::Citizen => self.citizen,
            Tier::Sovereign => self.sovereign,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartRouter {
    normal: PriorityTable,
    crisis: PriorityTable,
}

impl Default for SmartRouter {
    fn default() -> Self {
        Self {
            normal: PriorityTable::NORMAL,
            crisis: PriorityTable::CRISIS,
        }
    }
}

impl SmartRouter {
    pub fn with_priorities(normal: PriorityTable, crisis: PriorityTable) -> Self {
        Self { normal, crisis }
    }

    pub fn route(&self, order_quantity: u64, is_crisis: bool, mms: &[MarketMakerRef]) -> Vec<RoutingDecision> {
        if is_crisis {
            self.route_crisis(order_quantity, mms)
        } else {
            self.route_normal(order_quantity, mms)
        }
    }

    fn route_normal(&self, order_quantity: u64, mms: &[MarketMakerRef]) -> Vec<RoutingDecision> {
        if mms.is_empty() {
            return Vec::new();
        }
        let share = order_quantity / mms.len() as u64;
        mms.iter()
            .map(|mm| RoutingDecision {
                market_maker_id: mm.id.clone(),
                tier: mm.tier,
                priority: self.normal.priority(mm.tier),
                allocated_quantity: share,
            })
            .collect()
    }

    /// Truncation remainders inside a tier are left undistributed. The
    /// martyr pass always runs; later passes only while quantity remains.
    fn route_crisis(&self, order_quantity: u64, mms: &[MarketMakerRef]) -> Vec<RoutingDecision> {
        let mut decisions = Vec::new();
        let mut remaining = order_quantity;

        for (pass, tier) in Tier::CASCADE.into_iter().enumerate() {
            if pass > 0 && remaining == 0 {
                break;
            }
            let members: Vec<&MarketMakerRef> = mms.iter().filter(|mm| mm.tier == tier).collect();
            if members.is_empty() {
                continue;
            }
            let share = remaining / members.len() as u64;
            for mm in members {
                decisions.push(RoutingDecision {
                    market_maker_id: mm.id.clone(),
                    tier,
                    priority: self.crisis.priority(tier),
                    allocated_quantity: share,
                });
                remaining -= share;
            }
        }
        decisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mms(tiers: &[Tier]) -> Vec<MarketMakerRef> {
        tiers
            .iter()
            .enumerate()
            .map(|(i, t)| MarketMakerRef::new(format!("mm-{}", i), *t))
            .collect()
    }

    #[test]
    fn test_crisis_routes_to_martyr_first() {
        let router = SmartRouter::default();
        let out = router.route(1000, true, &mms(&[Tier::Sovereign, Tier::Martyr, Tier::Citizen]));
        assert_eq!(out[0].market_maker_id, "mm-1");
        assert_eq!(out[0].tier, Tier::Martyr);
        assert_eq!(out[0].allocated_quantity, 1000);
        assert_eq!(out[0].priority, 100);
        // Nothing left after the martyr pass, so no other tier is reached.
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_normal_mode_splits_evenly() {
        let router = SmartRouter::default();
        let out = router.route(1000, false, &mms(&[Tier::Sovereign, Tier::Martyr]));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.allocated_quantity == 500));
        assert_eq!(out[0].priority, 10);
        assert_eq!(out[1].priority, 50);
    }

    #[test]
    fn test_truncation_remainder_is_dropped() {
        let router = SmartRouter::default();
        let out = router.route(1000, false, &mms(&[Tier::Citizen; 3]));
        let total: u64 = out.iter().map(|d| d.allocated_quantity).sum();
        assert_eq!(total, 999);

        // Two martyrs split 1001 as 500 + 500.
        let out = router.route(1001, true, &mms(&[Tier::Martyr, Tier::Martyr, Tier::Sovereign]));
        assert_eq!(out[0].allocated_quantity, 500);
        assert_eq!(out[1].allocated_quantity, 500);
        // The stray unit carries into the sovereign pass.
        assert_eq!(out[2].tier, Tier::Sovereign);
        assert_eq!(out[2].allocated_quantity, 1);
        assert_eq!(out[2].priority, 5);
    }

    #[test]
    fn test_waterfall_skips_empty_tiers() {
        let router = SmartRouter::default();
        let out = router.route(90, true, &mms(&[Tier::Sovereign, Tier::Sovereign, Tier::Sovereign]));
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|d| d.allocated_quantity == 30 && d.priority == 5));
    }

    #[test]
    fn test_small_order_starves_lower_tiers() {
        let router = SmartRouter::default();
        // 3 martyrs on 2 units: each gets 0, remaining stays 2 for citizens.
        let out = router.route(2, true, &mms(&[Tier::Martyr, Tier::Martyr, Tier::Martyr, Tier::Citizen]));
        assert_eq!(out.len(), 4);
        assert_eq!(out[3].tier, Tier::Citizen);
        assert_eq!(out[3].allocated_quantity, 2);
    }

    #[test]
    fn test_empty_inputs() {
        let router = SmartRouter::default();
        assert!(router.route(1000, true, &[]).is_empty());
        assert!(router.route(1000, false, &[]).is_empty());
        let out = router.route(0, false, &mms(&[Tier::Martyr]));
        assert_eq!(out[0].allocated_quantity, 0);
    }

    #[test]
    fn test_zero_order_still_reaches_martyrs() {
        let router = SmartRouter::default();
        let out = router.route(0, true, &mms(&[Tier::Martyr, Tier::Citizen, Tier::Martyr]));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.tier == Tier::Martyr));
        assert!(out.iter().all(|d| d.allocated_quantity == 0 && d.priority == 100));

        // No martyrs: the citizen pass is gated on remaining quantity.
        assert!(router.route(0, true, &mms(&[Tier::Citizen, Tier::Sovereign])).is_empty());
    }

    #[test]
    fn test_never_over_allocates() {
        let router = SmartRouter::default();
        let set = mms(&[Tier::Citizen, Tier::Martyr, Tier::Sovereign, Tier::Citizen, Tier::Martyr]);
        for qty in [0u64, 1, 7, 999, 1_000_003] {
            for crisis in [true, false] {
                let total: u64 = router.route(qty, crisis, &set).iter().map(|d| d.allocated_quantity).sum();
                assert!(total <= qty, "qty={} crisis={} total={}", qty, crisis, total);
            }
        }
    }
}
