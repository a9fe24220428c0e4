use rusqlite::params;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::logging::{json_log, obj, v_bool, v_num, v_str, Domain};
use crate::storage::Store;

/// A capped (or uncapped) offer. Limits are static configuration, scaled to
/// the founders tiers: the durable claim rows are the source of truth for
/// how much capacity is left.
#[derive(Debug, Clone, Copy)]
pub struct Offer {
    pub id: &'static str,
    pub limit: Option<u32>,
}

pub const OFFERS: [Offer; 4] = [
    Offer { id: "free-domain", limit: Some(50) },
    Offer { id: "sovereign-25", limit: Some(25) },
    Offer { id: "zenith-lifetime-pro", limit: Some(10) },
    Offer { id: "zenith-discount-15", limit: None },
];

pub fn lookup_offer(offer_id: &str) -> Option<Offer> {
    OFFERS.iter().copied().find(|o| o.id == offer_id)
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferStatus {
    pub offer_id: String,
    pub claimed: u32,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct ClaimResult {
    /// True when this attempt found an existing (offer, fingerprint) row
    /// instead of inserting one.
    pub already_claimed: bool,
    pub status: OfferStatus,
}

fn status_for(offer: Offer, claimed: u32) -> OfferStatus {
    match offer.limit {
        Some(limit) => {
            let remaining = limit.saturating_sub(claimed);
            OfferStatus {
                offer_id: offer.id.to_string(),
                claimed,
                limit: Some(limit),
                remaining: Some(remaining),
                exhausted: remaining == 0,
            }
        }
        None => OfferStatus {
            offer_id: offer.id.to_string(),
            claimed,
            limit: None,
            remaining: None,
            exhausted: false,
        },
    }
}

/// Claim one slot of an offer, atomically and idempotently on
/// (offer_id, fingerprint). The count check and the insert run inside one
/// transaction under the store lock, so concurrent attempts for the last
/// slot produce exactly one winner; the UNIQUE constraint is the backstop
/// for anything the count misses.
pub fn create_offer_claim(
    store: &Store,
    offer_id: &str,
    fingerprint: &str,
    user_id: Option<&str>,
    now: i64,
) -> Result<ClaimResult, EngineError> {
    let offer = lookup_offer(offer_id)
        .ok_or_else(|| EngineError::InvalidInput(format!("unknown offer id: {offer_id}")))?;
    if fingerprint.is_empty() {
        return Err(EngineError::InvalidInput("claim fingerprint is required".to_string()));
    }

    let mut conn = store.lock();
    let tx = conn.transaction()?;

    let existing: u32 = tx.query_row(
        "SELECT COUNT(*) FROM offer_claims WHERE offer_id = ?1 AND fingerprint = ?2",
        params![offer.id, fingerprint],
        |row| row.get(0),
    )?;
    let claimed: u32 = tx.query_row(
        "SELECT COUNT(*) FROM offer_claims WHERE offer_id = ?1",
        params![offer.id],
        |row| row.get(0),
    )?;

    if existing > 0 {
        tx.commit()?;
        return Ok(ClaimResult { already_claimed: true, status: status_for(offer, claimed) });
    }

    if let Some(limit) = offer.limit {
        if claimed >= limit {
            tx.commit()?;
            return Err(EngineError::OfferExhausted { offer_id: offer.id.to_string() });
        }
    }

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO offer_claims (offer_id, fingerprint, user_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![offer.id, fingerprint, user_id, now],
    )?;
    tx.commit()?;

    let status = status_for(offer, claimed + inserted as u32);
    json_log(
        Domain::Claims,
        "claim_created",
        obj(&[
            ("offer_id", v_str(offer.id)),
            ("claimed", v_num(status.claimed as f64)),
            ("exhausted", v_bool(status.exhausted)),
        ]),
    );
    Ok(ClaimResult { already_claimed: inserted == 0, status })
}

/// Read-only capacity aggregate; never mutates state.
pub fn offer_status(store: &Store, offer_id: &str) -> Result<OfferStatus, EngineError> {
    let offer = lookup_offer(offer_id)
        .ok_or_else(|| EngineError::InvalidInput(format!("unknown offer id: {offer_id}")))?;
    let claimed: u32 = store.lock().query_row(
        "SELECT COUNT(*) FROM offer_claims WHERE offer_id = ?1",
        params![offer.id],
        |row| row.get(0),
    )?;
    Ok(status_for(offer, claimed))
}

/// Idempotency key for a prize-linked claim.
pub fn lead_fingerprint(lead_id: &str) -> String {
    format!("lead:{lead_id}")
}

/// Idempotency key for a claim tied to an authenticated account.
pub fn user_fingerprint(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Idempotency key for an anonymous claimant, derived from network identity.
pub fn anon_fingerprint(ip: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(format!("{ip}|{user_agent}").as_bytes());
    format!("anon:{}", hex::encode(digest))
}
