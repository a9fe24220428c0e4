use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::EngineError;
use crate::lead::{Lead, PrizeState};

/// SQLite-backed store. The connection mutex is the sole shared-mutable
/// boundary of the engine: every multi-step unit (create+link, count+insert)
/// runs as one transaction under this lock.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    pub fn init(&self) -> Result<(), EngineError> {
        self.lock().execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                referral_code TEXT NOT NULL UNIQUE,
                referred_by_id TEXT,
                referrals_count INTEGER NOT NULL DEFAULT 0,
                wheel_prize TEXT,
                wheel_prize_at INTEGER,
                sovereign_founder INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                source TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_leads_created_at ON leads(created_at);
            CREATE TABLE IF NOT EXISTS offer_claims (
                offer_id TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                user_id TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE(offer_id, fingerprint)
            );
            CREATE INDEX IF NOT EXISTS idx_claims_offer ON offer_claims(offer_id);
            COMMIT;",
        )?;
        Ok(())
    }

    /// A poisoned mutex only means another request panicked mid-write; the
    /// transaction it held already rolled back, so the guard stays usable.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, EngineError> {
        let conn = self.lock();
        let lead = conn
            .query_row(
                &format!("SELECT {} FROM leads WHERE email = ?1", LEAD_COLUMNS),
                params![email],
                lead_from_row,
            )
            .optional()?;
        Ok(lead)
    }

    pub fn find_lead_by_code(&self, code: &str) -> Result<Option<Lead>, EngineError> {
        let conn = self.lock();
        let lead = conn
            .query_row(
                &format!("SELECT {} FROM leads WHERE referral_code = ?1", LEAD_COLUMNS),
                params![code],
                lead_from_row,
            )
            .optional()?;
        Ok(lead)
    }

    pub fn find_lead_by_id(&self, id: &str) -> Result<Option<Lead>, EngineError> {
        let conn = self.lock();
        let lead = conn
            .query_row(
                &format!("SELECT {} FROM leads WHERE id = ?1", LEAD_COLUMNS),
                params![id],
                lead_from_row,
            )
            .optional()?;
        Ok(lead)
    }

    /// Leads with strictly earlier `created_at`, the input to base rank.
    pub fn count_earlier_leads(&self, created_at: i64) -> Result<u64, EngineError> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM leads WHERE created_at < ?1",
            params![created_at],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

pub const LEAD_COLUMNS: &str = "id, email, referral_code, referred_by_id, referrals_count, \
     wheel_prize, wheel_prize_at, sovereign_founder, created_at, source";

pub fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    let prize: Option<String> = row.get(5)?;
    let prize_at: Option<i64> = row.get(6)?;
    Ok(Lead {
        id: row.get(0)?,
        email: row.get(1)?,
        referral_code: row.get(2)?,
        referred_by_id: row.get(3)?,
        referrals_count: row.get::<_, i64>(4)? as u32,
        prize: PrizeState::from_columns(prize, prize_at),
        sovereign_founder: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        source: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.init().unwrap();
        store.init().unwrap();
    }

    #[test]
    fn test_claim_unique_constraint() {
        let store = Store::open_in_memory().unwrap();
        store.init().unwrap();
        let conn = store.lock();
        conn.execute(
            "INSERT INTO offer_claims (offer_id, fingerprint, created_at) VALUES ('o', 'f', 1)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO offer_claims (offer_id, fingerprint, created_at) VALUES ('o', 'f', 2)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_count_earlier_is_strict() {
        let store = Store::open_in_memory().unwrap();
        store.init().unwrap();
        {
            let conn = store.lock();
            for (id, ts) in [("a", 10), ("b", 20), ("c", 20)] {
                conn.execute(
                    "INSERT INTO leads (id, email, referral_code, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![id, format!("{id}@x.com"), format!("CODE{id}"), ts],
                )
                .unwrap();
            }
        }
        assert_eq!(store.count_earlier_leads(10).unwrap(), 0);
        assert_eq!(store.count_earlier_leads(20).unwrap(), 1);
        assert_eq!(store.count_earlier_leads(21).unwrap(), 3);
    }
}
