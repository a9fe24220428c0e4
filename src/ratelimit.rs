use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Every this many admission checks, expired keys are swept from the map.
const PRUNE_STRIDE: u64 = 256;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

/// Per-key sliding-window counter. Process-local and best-effort: multiple
/// worker processes each carry their own windows, which is acceptable
/// degradation rather than a correctness requirement.
pub struct SlidingWindowLimiter {
    limit: u32,
    window_secs: u64,
    hits: Mutex<HashMap<String, VecDeque<u64>>>,
    checks: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs, hits: Mutex::new(HashMap::new()), checks: AtomicU64::new(0) }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, chrono::Utc::now().timestamp() as u64)
    }

    /// Admission check at an explicit clock, for tests. A hit recorded at
    /// `t` stops counting once `now - t >= window_secs`. Keys whose windows
    /// have fully expired are swept every `PRUNE_STRIDE` checks, so the map
    /// stays bounded by recent traffic rather than by every IP ever seen.
    pub fn check_at(&self, key: &str, now: u64) -> RateDecision {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_STRIDE == PRUNE_STRIDE - 1 {
            prune_expired(&mut hits, self.window_secs, now);
        }
        let window = hits.entry(key.to_string()).or_default();
        while let Some(&oldest) = window.front() {
            if now.saturating_sub(oldest) >= self.window_secs {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() as u32 >= self.limit {
            let retry = window
                .front()
                .map(|&oldest| (oldest + self.window_secs).saturating_sub(now))
                .unwrap_or(self.window_secs);
            return RateDecision { allowed: false, remaining: 0, retry_after_secs: retry.max(1) };
        }

        window.push_back(now);
        RateDecision {
            allowed: true,
            remaining: self.limit - window.len() as u32,
            retry_after_secs: 0,
        }
    }

    /// Drop keys whose windows are empty at `now`. Runs on the check-path
    /// stride; also callable directly if a host wants an eager sweep.
    pub fn prune(&self, now: u64) {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        prune_expired(&mut hits, self.window_secs, now);
    }
}

fn prune_expired(hits: &mut HashMap<String, VecDeque<u64>>, window_secs: u64, now: u64) {
    hits.retain(|_, window| {
        window.back().map(|&t| now.saturating_sub(t) < window_secs).unwrap_or(false)
    });
}
