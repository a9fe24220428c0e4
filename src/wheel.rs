use rand::Rng;
use rusqlite::params;

use crate::error::EngineError;
use crate::lead::{Lead, PrizeState, WheelPrize};
use crate::logging::{json_log, obj, v_str, Domain};
use crate::storage::Store;

/// Cumulative upper thresholds over [0,1): queue_jump 50%,
/// sovereign_25_discount_code 25%, free_custom_domain 15%,
/// zenith_lifetime_pro 10%.
const THRESHOLDS: [(WheelPrize, f64); 4] = [
    (WheelPrize::QueueJump, 0.50),
    (WheelPrize::Sovereign25DiscountCode, 0.75),
    (WheelPrize::FreeCustomDomain, 0.90),
    (WheelPrize::ZenithLifetimePro, 1.0),
];

/// Map a uniform draw in [0,1) to a prize. A draw landing exactly on a
/// threshold belongs to the lower band.
pub fn prize_for_draw(r: f64) -> WheelPrize {
    for (prize, upper) in THRESHOLDS {
        if r <= upper {
            return prize;
        }
    }
    WheelPrize::ZenithLifetimePro
}

pub fn spin(rng: &mut impl Rng) -> WheelPrize {
    prize_for_draw(rng.gen::<f64>())
}

/// Assign a prize to a lead, exactly once. Re-invocations return the stored
/// prize untouched. The persist is a single guarded UPDATE, so two racing
/// assignments cannot both win: the loser re-reads whatever the winner wrote.
pub fn assign_prize(
    store: &Store,
    lead: &Lead,
    requested: Option<WheelPrize>,
    now: i64,
) -> Result<WheelPrize, EngineError> {
    if let PrizeState::Assigned { prize, .. } = lead.prize {
        return Ok(prize);
    }

    let candidate = match requested {
        Some(prize) => prize,
        None => spin(&mut rand::thread_rng()),
    };

    let updated = store.lock().execute(
        "UPDATE leads SET wheel_prize = ?1, wheel_prize_at = ?2
         WHERE id = ?3 AND wheel_prize IS NULL",
        params![candidate.as_str(), now, lead.id],
    )?;

    if updated == 0 {
        // Lost the write-once race; the stored prize stands.
        let current = store.find_lead_by_id(&lead.id)?.ok_or(EngineError::NotFound)?;
        return current.prize.prize().ok_or(EngineError::NotFound);
    }

    json_log(
        Domain::Wheel,
        "prize_assigned",
        obj(&[
            ("lead_id", v_str(&lead.id)),
            ("prize", v_str(candidate.as_str())),
            ("requested", crate::logging::v_bool(requested.is_some())),
        ]),
    );
    Ok(candidate)
}
