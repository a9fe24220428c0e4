//! Referral waitlist and capped-offer allocation engine.
//!
//! Admits leads onto a launch waitlist keyed by email, derives queue
//! positions from a referral graph, assigns a wheel prize from a fixed
//! distribution exactly once per lead, and enforces hard global caps on
//! scarce offers. SQLite is the sole shared-mutable-state and transaction
//! boundary; everything else is stateless per request apart from the
//! process-local rate limiter.

pub mod claims;
pub mod engine;
pub mod error;
pub mod lead;
pub mod logging;
pub mod position;
pub mod ratelimit;
pub mod registry;
pub mod state;
pub mod storage;
pub mod sync;
pub mod wheel;
