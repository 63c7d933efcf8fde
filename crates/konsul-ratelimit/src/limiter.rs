//! Rate-Limit Service (C7, spec §4.7): two independent token-bucket
//! stores (by-IP, by-API-key) behind allow/deny lists.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::bucket::Bucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Ip,
    ApiKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow { reason: &'static str },
    Deny { reason: &'static str },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ClientStatus {
    pub identifier: String,
    pub tokens: f64,
    pub last_request_at: DateTime<Utc>,
    pub custom: Option<(f64, f64, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Copy)]
struct DefaultLimits {
    rate: f64,
    burst: f64,
}

struct ListEntry {
    expires_at: Option<DateTime<Utc>>,
}

impl ListEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e > now).unwrap_or(true)
    }
}

pub struct RateLimiter {
    defaults: RwLock<DefaultLimits>,
    custom: RwLock<HashMap<String, (f64, f64, DateTime<Utc>)>>,
    allow_list: RwLock<HashMap<String, ListEntry>>,
    deny_list: RwLock<HashMap<String, ListEntry>>,
    by_ip: RwLock<HashMap<String, Bucket>>,
    by_key: RwLock<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(default_rate: f64, default_burst: f64) -> Self {
        Self {
            defaults: RwLock::new(DefaultLimits { rate: default_rate, burst: default_burst }),
            custom: RwLock::new(HashMap::new()),
            allow_list: RwLock::new(HashMap::new()),
            deny_list: RwLock::new(HashMap::new()),
            by_ip: RwLock::new(HashMap::new()),
            by_key: RwLock::new(HashMap::new()),
        }
    }

    pub fn check(&self, kind: IdentifierKind, identifier: &str) -> Decision {
        let now = Utc::now();
        if let Some(entry) = self.allow_list.read().get(identifier) {
            if entry.is_live(now) {
                return Decision::Allow { reason: "whitelisted" };
            }
        }
        if let Some(entry) = self.deny_list.read().get(identifier) {
            if entry.is_live(now) {
                return Decision::Deny { reason: "blacklisted" };
            }
        }

        let (rate, burst) = self.resolve_limits(identifier, now);
        let store = match kind {
            IdentifierKind::Ip => &self.by_ip,
            IdentifierKind::ApiKey => &self.by_key,
        };
        let monotonic_now = Instant::now();
        let mut store = store.write();
        let allowed = store
            .entry(identifier.to_string())
            .or_insert_with(|| Bucket::new(burst, monotonic_now))
            .try_take(rate, burst, monotonic_now);
        if allowed {
            Decision::Allow { reason: "ok" }
        } else {
            Decision::Deny { reason: "rate_limited" }
        }
    }

    fn resolve_limits(&self, identifier: &str, now: DateTime<Utc>) -> (f64, f64) {
        if let Some((rate, burst, expires_at)) = self.custom.read().get(identifier) {
            if *expires_at > now {
                return (*rate, *burst);
            }
        }
        let defaults = self.defaults.read();
        (defaults.rate, defaults.burst)
    }

    pub fn update_config(&self, rate: Option<f64>, burst: Option<f64>) {
        let mut defaults = self.defaults.write();
        if let Some(r) = rate {
            defaults.rate = r;
        }
        if let Some(b) = burst {
            defaults.burst = b;
        }
    }

    pub fn set_custom(&self, identifier: &str, rate: f64, burst: f64, duration: Duration) {
        let expires_at = Utc::now() + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        self.custom.write().insert(identifier.to_string(), (rate, burst, expires_at));
    }

    pub fn allow(&self, identifier: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero()));
        self.allow_list.write().insert(identifier.to_string(), ListEntry { expires_at });
    }

    pub fn deny(&self, identifier: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero()));
        self.deny_list.write().insert(identifier.to_string(), ListEntry { expires_at });
    }

    /// Removes buckets idle longer than `2 * cleanup_interval` to bound
    /// memory (spec §4.7 "Bucket cleanup").
    pub fn cleanup(&self, cleanup_interval: Duration) {
        let threshold = cleanup_interval.saturating_mul(2);
        let now = Instant::now();
        self.by_ip.write().retain(|_, bucket| bucket.idle_for(now) < threshold);
        self.by_key.write().retain(|_, bucket| bucket.idle_for(now) < threshold);
        let utc_now = Utc::now();
        self.allow_list.write().retain(|_, e| e.is_live(utc_now));
        self.deny_list.write().retain(|_, e| e.is_live(utc_now));
        self.custom.write().retain(|_, (_, _, expires_at)| *expires_at > utc_now);
    }

    pub fn stats(&self) -> (usize, usize) {
        (self.by_ip.read().len(), self.by_key.read().len())
    }

    pub fn list_active(&self, kind: Option<IdentifierKind>) -> Vec<String> {
        let mut out = Vec::new();
        if matches!(kind, None | Some(IdentifierKind::Ip)) {
            out.extend(self.by_ip.read().keys().cloned());
        }
        if matches!(kind, None | Some(IdentifierKind::ApiKey)) {
            out.extend(self.by_key.read().keys().cloned());
        }
        out
    }

    pub fn client_status(&self, kind: IdentifierKind, identifier: &str) -> Option<ClientStatus> {
        let store = match kind {
            IdentifierKind::Ip => &self.by_ip,
            IdentifierKind::ApiKey => &self.by_key,
        };
        let store = store.read();
        let bucket = store.get(identifier)?;
        let custom = self.custom.read().get(identifier).cloned();
        Some(ClientStatus {
            identifier: identifier.to_string(),
            tokens: bucket.tokens,
            last_request_at: bucket.last_request_at,
            custom,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_burst_is_admitted_then_exhausted() {
        let limiter = RateLimiter::new(1.0, 3.0);
        for _ in 0..3 {
            assert!(limiter.check(IdentifierKind::Ip, "1.2.3.4").is_allowed());
        }
        assert!(!limiter.check(IdentifierKind::Ip, "1.2.3.4").is_allowed());
    }

    #[test]
    fn allow_list_bypasses_bucket() {
        let limiter = RateLimiter::new(0.0, 0.0);
        limiter.allow("trusted", None);
        assert_eq!(limiter.check(IdentifierKind::ApiKey, "trusted"), Decision::Allow { reason: "whitelisted" });
    }

    #[test]
    fn deny_list_blocks_even_with_tokens() {
        let limiter = RateLimiter::new(100.0, 100.0);
        limiter.deny("bad-actor", None);
        assert_eq!(limiter.check(IdentifierKind::Ip, "bad-actor"), Decision::Deny { reason: "blacklisted" });
    }

    #[test]
    fn independent_stores_for_ip_and_api_key() {
        let limiter = RateLimiter::new(1.0, 1.0);
        assert!(limiter.check(IdentifierKind::Ip, "shared-id").is_allowed());
        assert!(limiter.check(IdentifierKind::ApiKey, "shared-id").is_allowed());
    }

    #[test]
    fn update_config_changes_default_for_new_buckets() {
        let limiter = RateLimiter::new(1.0, 1.0);
        limiter.update_config(None, Some(5.0));
        for _ in 0..5 {
            assert!(limiter.check(IdentifierKind::Ip, "fresh").is_allowed());
        }
    }

    #[test]
    fn set_custom_overrides_default_burst() {
        let limiter = RateLimiter::new(1.0, 1.0);
        limiter.set_custom("vip", 10.0, 10.0, Duration::from_secs(60));
        for _ in 0..10 {
            assert!(limiter.check(IdentifierKind::ApiKey, "vip").is_allowed());
        }
    }

    #[test]
    fn cleanup_removes_idle_buckets() {
        let limiter = RateLimiter::new(1.0, 1.0);
        limiter.check(IdentifierKind::Ip, "old");
        limiter.cleanup(Duration::from_nanos(1));
        assert_eq!(limiter.stats().0, 0);
    }

    #[test]
    fn client_status_reports_current_tokens() {
        let limiter = RateLimiter::new(1.0, 5.0);
        limiter.check(IdentifierKind::Ip, "x");
        let status = limiter.client_status(IdentifierKind::Ip, "x").unwrap();
        assert_eq!(status.tokens, 4.0);
    }
}
