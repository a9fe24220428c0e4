use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::claims::{create_offer_claim, lead_fingerprint, offer_status, OfferStatus};
use crate::error::EngineError;
use crate::lead::{validate_email, Lead, WheelPrize};
use crate::logging::{json_log, obj, v_str, Domain};
use crate::position::{compute_position, Position};
use crate::ratelimit::SlidingWindowLimiter;
use crate::registry::upsert_lead;
use crate::state::{now_ms, Config};
use crate::storage::Store;
use crate::sync::spawn_contact_sync;
use crate::wheel::assign_prize;

/// Drawn when a prize's capped offer is exhausted. Uncapped, so the
/// downgrade path can never cascade.
pub const FALLBACK_PRIZE: WheelPrize = WheelPrize::QueueJump;

/// Decision table: which capped offer a prize draws down, if any.
/// Prizes mapped to `None` need no claim.
pub fn prize_offer(prize: WheelPrize) -> Option<&'static str> {
    match prize {
        WheelPrize::QueueJump => None,
        WheelPrize::Sovereign25DiscountCode => Some("sovereign-25"),
        WheelPrize::FreeCustomDomain => Some("free-domain"),
        WheelPrize::ZenithLifetimePro => Some("zenith-lifetime-pro"),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub ip: String,
    pub email: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub referral_code: Option<String>,
    /// Client-asserted spin result. Anything outside the four prize names
    /// is ignored and a server-side draw is used instead.
    #[serde(default)]
    pub wheel_prize: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupRequest {
    pub ip: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Public lead fields; internals like `id` and `referred_by_id` stay out.
#[derive(Debug, Clone, Serialize)]
pub struct LeadPublic {
    pub email: String,
    pub referral_code: String,
    pub referral_url: String,
    pub referrals_count: u32,
    pub wheel_prize: Option<&'static str>,
    pub sovereign_founder: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitlistResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub lead: LeadPublic,
    pub position: Position,
}

pub struct Engine {
    cfg: Config,
    store: Store,
    read_limiter: SlidingWindowLimiter,
    write_limiter: SlidingWindowLimiter,
}

impl Engine {
    pub fn new(cfg: Config, store: Store) -> Self {
        let read_limiter = SlidingWindowLimiter::new(cfg.read_limit, cfg.window_secs);
        let write_limiter = SlidingWindowLimiter::new(cfg.write_limit, cfg.window_secs);
        Self { cfg, store, read_limiter, write_limiter }
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The write endpoint: signup (or re-signup) plus spin persistence.
    /// Every step is idempotent on (email) or (offer, fingerprint), so a
    /// client retry after a timeout is always safe.
    pub fn signup(&self, req: &SignupRequest) -> Result<WaitlistResponse, EngineError> {
        self.throttle(&self.write_limiter, "write", &req.ip)?;
        let now = now_ms();

        let upserted = upsert_lead(
            &self.store,
            &self.cfg,
            &req.email,
            req.source.as_deref(),
            req.referral_code.as_deref(),
            now,
        )?;
        if upserted.created {
            spawn_contact_sync(&self.cfg, &upserted.lead);
        }

        let requested = req.wheel_prize.as_deref().and_then(WheelPrize::parse);
        let assigned = assign_prize(&self.store, &upserted.lead, requested, now)?;
        self.settle_prize_claim(&upserted.lead, assigned, now)?;

        // Re-read: the claim settlement may have downgraded the prize, and
        // a concurrent referral may have bumped the counter.
        let lead = self
            .store
            .find_lead_by_id(&upserted.lead.id)?
            .ok_or(EngineError::NotFound)?;
        let earlier = self.store.count_earlier_leads(lead.created_at)?;
        let position = compute_position(&self.cfg, earlier, &lead);

        Ok(WaitlistResponse {
            message: Some("You are on the OpsVantage launch waitlist.".to_string()),
            lead: self.public(&lead),
            position,
        })
    }

    /// The read endpoint: lookup by email or referral code. Possession of
    /// either is the only credential.
    pub fn lookup(&self, req: &LookupRequest) -> Result<WaitlistResponse, EngineError> {
        self.throttle(&self.read_limiter, "read", &req.ip)?;

        let lead = match (&req.email, &req.referral_code) {
            (Some(email), _) => {
                let normalized = validate_email(email)?;
                self.store.find_lead_by_email(&normalized)?
            }
            (None, Some(code)) => self.store.find_lead_by_code(code)?,
            (None, None) => {
                return Err(EngineError::InvalidInput(
                    "email or referral_code is required".to_string(),
                ))
            }
        };
        let lead = lead.ok_or(EngineError::NotFound)?;

        let earlier = self.store.count_earlier_leads(lead.created_at)?;
        let position = compute_position(&self.cfg, earlier, &lead);
        Ok(WaitlistResponse { message: None, lead: self.public(&lead), position })
    }

    /// Admin/UI capacity readout; unthrottled and read-only.
    pub fn offer_report(&self, offer_id: &str) -> Result<OfferStatus, EngineError> {
        offer_status(&self.store, offer_id)
    }

    /// Claim the capped offer behind an assigned prize; on exhaustion,
    /// silently downgrade the persisted prize to the fallback. Returns the
    /// effective prize.
    fn settle_prize_claim(
        &self,
        lead: &Lead,
        assigned: WheelPrize,
        now: i64,
    ) -> Result<WheelPrize, EngineError> {
        let Some(offer_id) = prize_offer(assigned) else {
            return Ok(assigned);
        };
        match create_offer_claim(&self.store, offer_id, &lead_fingerprint(&lead.id), None, now) {
            Ok(_) => Ok(assigned),
            Err(EngineError::OfferExhausted { .. }) => {
                // The guard keeps a racing downgrade from clobbering a
                // prize some other path already settled.
                self.store.lock().execute(
                    "UPDATE leads SET wheel_prize = ?1, wheel_prize_at = ?2
                     WHERE id = ?3 AND wheel_prize = ?4",
                    params![FALLBACK_PRIZE.as_str(), now, lead.id, assigned.as_str()],
                )?;
                json_log(
                    Domain::Claims,
                    "prize_downgraded",
                    obj(&[
                        ("lead_id", v_str(&lead.id)),
                        ("from", v_str(assigned.as_str())),
                        ("to", v_str(FALLBACK_PRIZE.as_str())),
                        ("offer_id", v_str(offer_id)),
                    ]),
                );
                Ok(FALLBACK_PRIZE)
            }
            Err(err) => Err(err),
        }
    }

    fn throttle(
        &self,
        limiter: &SlidingWindowLimiter,
        endpoint: &str,
        ip: &str,
    ) -> Result<(), EngineError> {
        let decision = limiter.check(ip);
        if !decision.allowed {
            json_log(
                Domain::Throttle,
                "rate_limited",
                obj(&[
                    ("endpoint", v_str(endpoint)),
                    ("ip", v_str(ip)),
                    ("retry_after_secs", crate::logging::v_num(decision.retry_after_secs as f64)),
                ]),
            );
            return Err(EngineError::RateLimited { retry_after_secs: decision.retry_after_secs });
        }
        Ok(())
    }

    fn public(&self, lead: &Lead) -> LeadPublic {
        LeadPublic {
            email: lead.email.clone(),
            referral_code: lead.referral_code.clone(),
            referral_url: self.cfg.referral_url(&lead.referral_code),
            referrals_count: lead.referrals_count,
            wheel_prize: lead.prize.prize().map(|p| p.as_str()),
            sovereign_founder: lead.sovereign_founder,
            created_at: lead.created_at,
        }
    }
}
