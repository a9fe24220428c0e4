use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use launchlist::engine::{Engine, LookupRequest, SignupRequest};
use launchlist::error::EngineError;
use launchlist::logging::{json_log, obj, v_str, Domain};
use launchlist::state::Config;
use launchlist::storage::Store;

/// One request per stdin line, one JSON response per stdout line. The
/// transport in front of this loop (HTTP, queue, test harness) is somebody
/// else's concern.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Signup(SignupRequest),
    Lookup(LookupRequest),
    OfferStatus { offer_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let store = Store::open(&cfg.sqlite_path)?;
    store.init()?;
    json_log(
        Domain::System,
        "engine_started",
        obj(&[("sqlite_path", v_str(&cfg.sqlite_path))]),
    );
    let engine = Engine::new(cfg, store);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Request>(line) {
            Ok(Request::Signup(req)) => respond(engine.signup(&req)),
            Ok(Request::Lookup(req)) => respond(engine.lookup(&req)),
            Ok(Request::OfferStatus { offer_id }) => respond(engine.offer_report(&offer_id)),
            Err(err) => json!({ "error": "invalid_input", "message": err.to_string() }),
        };
        println!("{}", reply);
    }

    json_log(Domain::System, "engine_stopped", obj(&[]));
    Ok(())
}

fn respond<T: serde::Serialize>(result: Result<T, EngineError>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::to_value(value)
            .unwrap_or_else(|err| json!({ "error": "store", "message": err.to_string() })),
        Err(err) => {
            let mut body = json!({ "error": err.kind(), "message": err.to_string() });
            if let EngineError::RateLimited { retry_after_secs } = err {
                body["retry_after_secs"] = json!(retry_after_secs);
            }
            body
        }
    }
}
