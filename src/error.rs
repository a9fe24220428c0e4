use thiserror::Error;

/// Engine-level error taxonomy. `OfferExhausted` is consumed inside the
/// write path (fallback downgrade); every other kind propagates to the
/// boundary with its kind intact so callers can pick user-facing copy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found")]
    NotFound,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Referral-code generation collided on every retry. Surfaced as a
    /// retryable server error; the client may simply resubmit.
    #[error("referral code allocation exhausted")]
    AllocationExhausted,

    /// Capped offer is at its limit. Not user-facing: the write path
    /// substitutes the fallback offer and proceeds.
    #[error("offer {offer_id} exhausted")]
    OfferExhausted { offer_id: String },

    /// Transient store errors pass through untranslated; the store layer's
    /// own retry policy owns recovery.
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::NotFound => "not_found",
            EngineError::RateLimited { .. } => "rate_limited",
            EngineError::AllocationExhausted => "allocation_exhausted",
            EngineError::OfferExhausted { .. } => "offer_exhausted",
            EngineError::Store(_) => "store",
        }
    }
}
