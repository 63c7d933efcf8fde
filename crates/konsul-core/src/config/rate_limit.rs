use serde::{Deserialize, Serialize};

/// Defaults for the per-identifier rate-limit service (C7). Distinct from
/// `ServerConfig::rate_limit`, which governs the HTTP-layer per-IP
/// `tower_governor` limiter in front of the whole API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_rate")]
    pub default_rate_per_second: f64,
    #[serde(default = "d_burst")]
    pub default_burst: u32,
    #[serde(default = "d_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_rate_per_second: d_rate(),
            default_burst: d_burst(),
            cleanup_interval_seconds: d_cleanup_interval(),
        }
    }
}

fn d_rate() -> f64 {
    100.0
}
fn d_burst() -> u32 {
    200
}
fn d_cleanup_interval() -> u64 {
    60
}
