use serde_json::json;
use tokio::runtime::Handle;

use crate::lead::Lead;
use crate::logging::{json_log, log, obj, v_str, Domain, Level};
use crate::state::Config;

/// Fire-and-forget contact-list sync, invoked on first creation only.
/// Failures are logged and swallowed; the signup response never waits on
/// or surfaces anything from this path.
pub fn spawn_contact_sync(cfg: &Config, lead: &Lead) {
    let Some(url) = cfg.crm_sync_url.clone() else {
        return;
    };
    let Ok(handle) = Handle::try_current() else {
        log(
            Level::Debug,
            Domain::Sync,
            "sync_skipped",
            obj(&[("reason", v_str("no async runtime"))]),
        );
        return;
    };

    let payload = json!({
        "email": lead.email,
        "referral_code": lead.referral_code,
        "source": lead.source,
        "created_at": lead.created_at,
    });
    let email = lead.email.clone();

    handle.spawn(async move {
        let client = reqwest::Client::new();
        let result = client
            .post(&url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                json_log(Domain::Sync, "contact_synced", obj(&[("email", v_str(&email))]));
            }
            Ok(resp) => {
                log(
                    Level::Warn,
                    Domain::Sync,
                    "sync_rejected",
                    obj(&[
                        ("email", v_str(&email)),
                        ("status", v_str(resp.status().as_str())),
                    ]),
                );
            }
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Sync,
                    "sync_failed",
                    obj(&[("email", v_str(&email)), ("error", v_str(&err.to_string()))]),
                );
            }
        }
    });
}
