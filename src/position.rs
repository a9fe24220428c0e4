use serde::Serialize;

use crate::lead::{Lead, WheelPrize};
use crate::state::Config;

/// Estimated queue rank. Never persisted; recomputed from current state on
/// every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub base: u64,
    pub boost: u64,
    pub estimated: u64,
}

/// Pure function of the lead and the count of strictly-earlier signups.
/// `base` is signup order, `boost` rewards referrals and the queue-jump
/// prize, and the referral milestone caps the estimate at a fixed rank.
pub fn compute_position(cfg: &Config, earlier_leads: u64, lead: &Lead) -> Position {
    let base = 1 + earlier_leads;

    let prize_boost = match lead.prize.prize() {
        Some(WheelPrize::QueueJump) => cfg.queue_jump_boost as u64,
        _ => 0,
    };
    let boost = lead.referrals_count as u64 * cfg.boost_per_referral as u64 + prize_boost;

    let mut estimated = base.saturating_sub(boost).max(1);
    if lead.referrals_count >= cfg.referral_milestone {
        estimated = estimated.min(cfg.milestone_position);
    }

    Position { base, boost, estimated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::PrizeState;

    fn lead(referrals: u32, prize: PrizeState) -> Lead {
        Lead {
            id: "x".to_string(),
            email: "x@x.com".to_string(),
            referral_code: "XXXXXXXX".to_string(),
            referred_by_id: None,
            referrals_count: referrals,
            prize,
            sovereign_founder: false,
            created_at: 0,
            source: None,
        }
    }

    fn cfg() -> Config {
        Config::from_env()
    }

    #[test]
    fn test_first_lead_is_position_one() {
        let p = compute_position(&cfg(), 0, &lead(0, PrizeState::Unassigned));
        assert_eq!(p, Position { base: 1, boost: 0, estimated: 1 });
    }

    #[test]
    fn test_boost_subtracts_but_floors_at_one() {
        let p = compute_position(&cfg(), 4, &lead(1, PrizeState::Unassigned));
        assert_eq!(p.base, 5);
        assert_eq!(p.boost, 10);
        assert_eq!(p.estimated, 1);
    }

    #[test]
    fn test_queue_jump_adds_hundred() {
        let prize = PrizeState::Assigned { prize: WheelPrize::QueueJump, at: 1 };
        let p = compute_position(&cfg(), 499, &lead(0, prize));
        assert_eq!(p.base, 500);
        assert_eq!(p.boost, 100);
        assert_eq!(p.estimated, 400);
    }

    #[test]
    fn test_non_jump_prize_adds_nothing() {
        let prize = PrizeState::Assigned { prize: WheelPrize::FreeCustomDomain, at: 1 };
        let p = compute_position(&cfg(), 499, &lead(0, prize));
        assert_eq!(p.boost, 0);
    }

    #[test]
    fn test_more_referrals_never_worsen_position() {
        let c = cfg();
        let mut last = u64::MAX;
        for referrals in 0..=3 {
            let p = compute_position(&c, 999, &lead(referrals, PrizeState::Unassigned));
            assert!(p.estimated <= last, "estimated rose at {referrals} referrals");
            last = p.estimated;
        }
    }

    #[test]
    fn test_milestone_caps_at_fifty() {
        let p = compute_position(&cfg(), 9999, &lead(3, PrizeState::Unassigned));
        assert_eq!(p.base, 10000);
        assert!(p.estimated <= 50);
    }

    #[test]
    fn test_milestone_never_worsens_a_better_rank() {
        // Already ahead of rank 50: the milestone must not push the lead back.
        let p = compute_position(&cfg(), 10, &lead(5, PrizeState::Unassigned));
        assert!(p.estimated < 50);
        assert_eq!(p.estimated, 1);
    }
}
