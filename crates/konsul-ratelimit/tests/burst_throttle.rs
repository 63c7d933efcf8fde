//! A burst of 5 requests within a token bucket's burst capacity all pass,
//! the 6th in the same window is denied, and a later request after enough
//! time has elapsed to refill one token is allowed again.

use std::thread::sleep;
use std::time::Duration;

use konsul_ratelimit::{IdentifierKind, RateLimiter};

#[test]
fn burst_then_throttle_then_recovery() {
    let limiter = RateLimiter::new(10.0, 5.0);

    for _ in 0..5 {
        assert!(limiter.check(IdentifierKind::Ip, "1.2.3.4").is_allowed());
    }
    assert!(!limiter.check(IdentifierKind::Ip, "1.2.3.4").is_allowed(), "6th request in the burst window must be denied");

    sleep(Duration::from_millis(150));
    assert!(limiter.check(IdentifierKind::Ip, "1.2.3.4").is_allowed(), "token refilled after the window should allow one more");
}

#[test]
fn distinct_identifiers_have_independent_buckets() {
    let limiter = RateLimiter::new(1.0, 1.0);
    assert!(limiter.check(IdentifierKind::Ip, "a").is_allowed());
    assert!(!limiter.check(IdentifierKind::Ip, "a").is_allowed());
    assert!(limiter.check(IdentifierKind::Ip, "b").is_allowed(), "a separate identifier must not share a's exhausted bucket");
}
