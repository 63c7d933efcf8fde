//! Single token bucket (spec §4.7 "Model").

use std::time::Instant;

use chrono::{DateTime, Utc};

pub struct Bucket {
    pub tokens: f64,
    pub last_refill: Instant,
    pub last_request_at: DateTime<Utc>,
}

impl Bucket {
    pub fn new(burst: f64, now: Instant) -> Self {
        Self { tokens: burst, last_refill: now, last_request_at: Utc::now() }
    }

    /// Refills against `(rate, burst)` looked up fresh at call time so a
    /// config change takes effect at the bucket's next refill, then
    /// attempts to take one token.
    pub fn try_take(&mut self, rate: f64, burst: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;
        self.last_request_at = Utc::now();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_refill)
    }
}
