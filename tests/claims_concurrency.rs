//! Cap enforcement under contention: N concurrent claimants against a
//! limit of L must produce exactly L winners and N-L exhaustion results,
//! never an over-allocation.

use std::sync::Arc;
use std::thread;

use launchlist::claims::{create_offer_claim, offer_status};
use launchlist::error::EngineError;
use launchlist::registry::upsert_lead;
use launchlist::state::Config;
use launchlist::storage::Store;

fn shared_store() -> (Arc<Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("claims.sqlite");
    let store = Store::open(path.to_str().expect("utf8 path")).expect("open store");
    store.init().expect("init schema");
    (Arc::new(store), dir)
}

#[test]
fn concurrent_claims_never_exceed_limit() {
    let (store, _dir) = shared_store();
    let offer = "zenith-lifetime-pro"; // limit 10
    let n = 25;

    let handles: Vec<_> = (0..n)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                create_offer_claim(&store, offer, &format!("lead:{i}"), None, i as i64)
            })
        })
        .collect();

    let mut won = 0;
    let mut exhausted = 0;
    for handle in handles {
        match handle.join().expect("claim thread panicked") {
            Ok(result) => {
                assert!(!result.already_claimed, "fingerprints are distinct");
                won += 1;
            }
            Err(EngineError::OfferExhausted { offer_id }) => {
                assert_eq!(offer_id, offer);
                exhausted += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(won, 10, "exactly the limit wins");
    assert_eq!(exhausted, n - 10);

    let status = offer_status(&store, offer).unwrap();
    assert_eq!(status.claimed, 10);
    assert_eq!(status.remaining, Some(0));
    assert!(status.exhausted);
}

#[test]
fn concurrent_retries_of_one_claim_count_once() {
    let (store, _dir) = shared_store();
    let offer = "sovereign-25";

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || create_offer_claim(&store, offer, "lead:same", None, 1))
        })
        .collect();

    let mut fresh = 0;
    for handle in handles {
        let result = handle.join().expect("claim thread panicked").expect("claim ok");
        if !result.already_claimed {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1, "one insert, the rest idempotent hits");
    assert_eq!(offer_status(&store, offer).unwrap().claimed, 1);
}

#[test]
fn concurrent_duplicate_signups_create_one_lead() {
    let (store, _dir) = shared_store();
    let cfg = Config::from_env();

    let referrer = upsert_lead(&store, &cfg, "ref@x.com", None, None, 1).unwrap().lead;
    let code = referrer.referral_code.clone();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let cfg = cfg.clone();
            let code = code.clone();
            thread::spawn(move || {
                upsert_lead(&store, &cfg, "dup@x.com", None, Some(&code), 2)
            })
        })
        .collect();

    let mut created = 0;
    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let result = handle.join().expect("signup thread panicked").expect("signup ok");
        if result.created {
            created += 1;
        }
        ids.insert(result.lead.id.clone());
    }

    assert_eq!(created, 1, "one creation, the rest idempotent gets");
    assert_eq!(ids.len(), 1);

    // The referrer was counted for the lead, not per attempt.
    let referrer = store.find_lead_by_id(&referrer.id).unwrap().unwrap();
    assert_eq!(referrer.referrals_count, 1);
}
