use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// The four wheel rewards. Order matters: it is the cumulative-threshold
/// order of the draw ([0, .5, .75, .9, 1.0]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelPrize {
    QueueJump,
    Sovereign25DiscountCode,
    FreeCustomDomain,
    ZenithLifetimePro,
}

impl WheelPrize {
    pub fn as_str(&self) -> &'static str {
        match self {
            WheelPrize::QueueJump => "queue_jump",
            WheelPrize::Sovereign25DiscountCode => "sovereign_25_discount_code",
            WheelPrize::FreeCustomDomain => "free_custom_domain",
            WheelPrize::ZenithLifetimePro => "zenith_lifetime_pro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queue_jump" => Some(WheelPrize::QueueJump),
            "sovereign_25_discount_code" => Some(WheelPrize::Sovereign25DiscountCode),
            "free_custom_domain" => Some(WheelPrize::FreeCustomDomain),
            "zenith_lifetime_pro" => Some(WheelPrize::ZenithLifetimePro),
            _ => None,
        }
    }
}

/// Write-once prize slot. "Already assigned" is a variant, not a
/// nullable-check convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrizeState {
    Unassigned,
    Assigned { prize: WheelPrize, at: i64 },
}

impl PrizeState {
    pub fn from_columns(prize: Option<String>, at: Option<i64>) -> Self {
        match (prize.as_deref().and_then(WheelPrize::parse), at) {
            (Some(prize), Some(at)) => PrizeState::Assigned { prize, at },
            _ => PrizeState::Unassigned,
        }
    }

    pub fn prize(&self) -> Option<WheelPrize> {
        match self {
            PrizeState::Assigned { prize, .. } => Some(*prize),
            PrizeState::Unassigned => None,
        }
    }
}

/// A waitlist registrant. Mirrors the `leads` table row.
#[derive(Debug, Clone)]
pub struct Lead {
    pub id: String,
    pub email: String,
    pub referral_code: String,
    pub referred_by_id: Option<String>,
    pub referrals_count: u32,
    pub prize: PrizeState,
    pub sovereign_founder: bool,
    pub created_at: i64,
    pub source: Option<String>,
}

/// Basic `local@domain.tld` shape check, same acceptance as the signup
/// form's `/.+@.+\..+/`. Deliverability is out of scope.
pub fn validate_email(raw: &str) -> Result<String, EngineError> {
    let trimmed = raw.trim();
    let normalized = trimmed.to_lowercase();
    let ok = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.split_once('.').map(|(host, tld)| !host.is_empty() && !tld.is_empty()).unwrap_or(false)
        }
        None => false,
    };
    if !ok {
        return Err(EngineError::InvalidInput("valid email is required".to_string()));
    }
    Ok(normalized)
}

// URL-safe, no 0/O or 1/I/l lookalikes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub fn generate_referral_code(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn generate_lead_id(rng: &mut impl Rng) -> String {
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}
