use rusqlite::{params, ErrorCode, Transaction};

use crate::error::EngineError;
use crate::lead::{generate_lead_id, generate_referral_code, validate_email, Lead, PrizeState};
use crate::logging::{json_log, obj, v_bool, v_num, v_str, Domain};
use crate::state::Config;
use crate::storage::{lead_from_row, Store, LEAD_COLUMNS};

#[derive(Debug, Clone)]
pub struct UpsertResult {
    pub lead: Lead,
    /// True when this call created the row (first signup for the email).
    pub created: bool,
}

/// Create-or-get a lead by normalized email. Idempotent: a repeat signup
/// only refreshes `source` and never regenerates the referral code or
/// touches the prize. Creation, referral linking, and the referrer's
/// counter increment are one transaction, so a concurrent duplicate signup
/// cannot double-link or double-count.
pub fn upsert_lead(
    store: &Store,
    cfg: &Config,
    email_raw: &str,
    source: Option<&str>,
    referrer_code: Option<&str>,
    now: i64,
) -> Result<UpsertResult, EngineError> {
    let email = validate_email(email_raw)?;
    let source = source
        .map(|s| s.trim().chars().take(cfg.source_max_len).collect::<String>())
        .filter(|s| !s.is_empty());

    let mut conn = store.lock();
    let tx = conn.transaction()?;

    if let Some(existing) = find_by_email(&tx, &email)? {
        let lead = refresh_source(&tx, existing, source)?;
        tx.commit()?;
        return Ok(UpsertResult { lead, created: false });
    }

    // Referrer resolution: a code that points back at this email never
    // links (self-referral through code reuse).
    let referrer = match referrer_code {
        Some(code) => find_by_code(&tx, code)?.filter(|r| r.email != email),
        None => None,
    };

    let lead = match insert_with_fresh_code(&tx, cfg, &email, source.clone(), referrer.as_ref(), now)? {
        CodeInsert::Created(lead) => lead,
        CodeInsert::EmailRace => {
            // Another process committed this email between our lookup and
            // the insert. Resolve as create-or-get, same as the early path.
            let existing = find_by_email(&tx, &email)?
                .ok_or(EngineError::Store(rusqlite::Error::QueryReturnedNoRows))?;
            let lead = refresh_source(&tx, existing, source)?;
            tx.commit()?;
            return Ok(UpsertResult { lead, created: false });
        }
    };

    if let Some(referrer) = &referrer {
        let share = lead.source.as_deref().map(|s| s.starts_with("share")).unwrap_or(false);
        let weight = if share { cfg.share_weight } else { 1 };
        // In-place increment; never read-modify-write.
        tx.execute(
            "UPDATE leads SET referrals_count = referrals_count + ?1 WHERE id = ?2",
            params![weight, referrer.id],
        )?;
        json_log(
            Domain::Referral,
            "referral_linked",
            obj(&[
                ("referrer_id", v_str(&referrer.id)),
                ("lead_id", v_str(&lead.id)),
                ("weight", v_num(weight as f64)),
                ("share_channel", v_bool(share)),
            ]),
        );
    }

    tx.commit()?;
    json_log(
        Domain::Registry,
        "lead_created",
        obj(&[
            ("lead_id", v_str(&lead.id)),
            ("email", v_str(&lead.email)),
            ("code", v_str(&lead.referral_code)),
            ("referred", v_bool(lead.referred_by_id.is_some())),
        ]),
    );
    Ok(UpsertResult { lead, created: true })
}

enum CodeInsert {
    Created(Lead),
    /// The email's UNIQUE constraint fired: a row for this address landed
    /// after our lookup, which only another process sharing the file can
    /// cause. The caller resolves it as an idempotent get.
    EmailRace,
}

/// Insert the new lead, regenerating the referral code on a uniqueness
/// collision, up to `code_retry_max` attempts. This loop is the only place
/// code collisions are handled; pre-checking the code would reopen the race.
fn insert_with_fresh_code(
    tx: &Transaction<'_>,
    cfg: &Config,
    email: &str,
    source: Option<String>,
    referrer: Option<&Lead>,
    now: i64,
) -> Result<CodeInsert, EngineError> {
    let mut rng = rand::thread_rng();
    let id = generate_lead_id(&mut rng);
    let referred_by_id = referrer.map(|r| r.id.clone());

    for attempt in 0..cfg.code_retry_max {
        let code = generate_referral_code(&mut rng, cfg.code_len);
        let inserted = tx.execute(
            "INSERT INTO leads (id, email, referral_code, referred_by_id, created_at, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, email, code, referred_by_id, now, source],
        );
        match inserted {
            Ok(_) => {
                return Ok(CodeInsert::Created(Lead {
                    id,
                    email: email.to_string(),
                    referral_code: code,
                    referred_by_id,
                    referrals_count: 0,
                    prize: PrizeState::Unassigned,
                    sovereign_founder: false,
                    created_at: now,
                    source,
                }))
            }
            Err(err) if unique_violation_on(&err, "leads.email") => {
                return Ok(CodeInsert::EmailRace);
            }
            Err(err) if unique_violation_on(&err, "leads.referral_code") => {
                json_log(
                    Domain::Registry,
                    "code_collision",
                    obj(&[("attempt", v_num(attempt as f64 + 1.0)), ("code", v_str(&code))]),
                );
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(EngineError::AllocationExhausted)
}

/// True when `err` is a UNIQUE violation naming `column`; SQLite spells
/// these "UNIQUE constraint failed: <table>.<column>".
fn unique_violation_on(err: &rusqlite::Error, column: &str) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.contains(column)
    )
}

fn refresh_source(
    tx: &Transaction<'_>,
    mut lead: Lead,
    source: Option<String>,
) -> Result<Lead, EngineError> {
    if let Some(src) = source {
        tx.execute("UPDATE leads SET source = ?1 WHERE id = ?2", params![src, lead.id])?;
        lead.source = Some(src);
    }
    Ok(lead)
}

fn find_by_email(tx: &Transaction<'_>, email: &str) -> Result<Option<Lead>, EngineError> {
    use rusqlite::OptionalExtension;
    Ok(tx
        .query_row(
            &format!("SELECT {} FROM leads WHERE email = ?1", LEAD_COLUMNS),
            params![email],
            lead_from_row,
        )
        .optional()?)
}

fn find_by_code(tx: &Transaction<'_>, code: &str) -> Result<Option<Lead>, EngineError> {
    use rusqlite::OptionalExtension;
    Ok(tx
        .query_row(
            &format!("SELECT {} FROM leads WHERE referral_code = ?1", LEAD_COLUMNS),
            params![code],
            lead_from_row,
        )
        .optional()?)
}
