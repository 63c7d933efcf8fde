//! Rate-Limit Service (C7): per-identifier token buckets with allow/deny
//! lists and dynamic reconfiguration.

pub mod bucket;
pub mod limiter;

pub use limiter::{ClientStatus, Decision, IdentifierKind, RateLimiter};
