#[derive(Clone)]
pub struct Config {
    pub sqlite_path: String,
    pub share_base_url: String,
    pub read_limit: u32,
    pub write_limit: u32,
    pub window_secs: u64,
    pub code_len: usize,
    pub code_retry_max: u32,
    pub source_max_len: usize,
    pub boost_per_referral: u32,
    pub queue_jump_boost: u32,
    pub share_weight: u32,
    pub referral_milestone: u32,
    pub milestone_position: u64,
    pub crm_sync_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./waitlist.sqlite".to_string()),
            share_base_url: std::env::var("SHARE_BASE_URL").unwrap_or_else(|_| "https://zenith.opsvantage.com".to_string()),
            read_limit: std::env::var("READ_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            write_limit: std::env::var("WRITE_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(15),
            window_secs: std::env::var("RATE_WINDOW_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            code_len: std::env::var("CODE_LEN").ok().and_then(|v| v.parse().ok()).unwrap_or(8),
            code_retry_max: std::env::var("CODE_RETRY_MAX").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            source_max_len: std::env::var("SOURCE_MAX_LEN").ok().and_then(|v| v.parse().ok()).unwrap_or(120),
            boost_per_referral: std::env::var("BOOST_PER_REFERRAL").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            queue_jump_boost: std::env::var("QUEUE_JUMP_BOOST").ok().and_then(|v| v.parse().ok()).unwrap_or(100),
            share_weight: std::env::var("SHARE_WEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
            referral_milestone: std::env::var("REFERRAL_MILESTONE").ok().and_then(|v| v.parse().ok()).unwrap_or(3),
            milestone_position: std::env::var("MILESTONE_POSITION").ok().and_then(|v| v.parse().ok()).unwrap_or(50),
            crm_sync_url: std::env::var("CRM_SYNC_URL").ok(),
        }
    }

    pub fn referral_url(&self, code: &str) -> String {
        format!("{}/?ref={}", self.share_base_url.trim_end_matches('/'), code)
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
