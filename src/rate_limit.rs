use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::debug;

use crate::metrics::TRACKED_CALLERS;

// Sliding-window limiter: one sorted admission log per caller key.
pub struct RateLimiter {
    logs: DashMap<String, VecDeque<Instant>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            logs: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Decide whether `key` may make a request at `now`, recording it if so.
    //
    // The whole check-and-record runs under the entry guard for `key`, so two
    // concurrent callers with the same key are serialized and can never both
    // take the last free slot. Rejected attempts are not recorded.
    pub fn admit(&self, key: &str, now: Instant) -> bool {
        let mut log = self.logs.entry(key.to_string()).or_default();

        expire(&mut log, now, self.window);

        if log.len() >= self.limit {
            return false;
        }

        // callers may race to the guard with slightly out-of-order instants
        let pos = log.partition_point(|t| *t <= now);
        log.insert(pos, now);
        true
    }

    // Drop callers whose logs hold nothing younger than the window.
    // Returns how many keys were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.logs.len();
        self.logs.retain(|_, log| {
            expire(log, now, self.window);
            !log.is_empty()
        });
        before.saturating_sub(self.logs.len())
    }

    pub fn tracked_callers(&self) -> usize {
        self.logs.len()
    }
}

// entries exactly `window` old are expired
fn expire(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = log.front() {
        if now.saturating_duration_since(oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

// Idle-key sweeper, runs for the lifetime of the long-lived host
pub async fn sweeper(limiter: Arc<RateLimiter>, every: Duration) {
    let mut interval = interval(every);

    debug!(?every, "rate limit sweeper started");

    loop {
        interval.tick().await;

        let removed = limiter.sweep(Instant::now());
        let remaining = limiter.tracked_callers();
        TRACKED_CALLERS.set(remaining as f64);

        if removed > 0 {
            debug!(removed, remaining, "swept idle callers");
        }
    }
}
