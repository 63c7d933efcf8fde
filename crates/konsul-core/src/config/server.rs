use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Per-IP rate limiting at the HTTP layer (distinct from the core's
    /// per-identifier C7 rate-limit service, which operates on logical
    /// principals rather than raw source IPs).
    #[serde(default)]
    pub rate_limit: Option<HttpRateLimitConfig>,
    /// Env var name holding the bearer token gating the admin surface.
    /// Unset/empty env var means admin endpoints run unauthenticated
    /// (dev mode) — a startup warning is logged in that case.
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
            rate_limit: None,
            admin_token_env: d_admin_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: d_cors_origins() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

fn d_port() -> u16 {
    8501
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_admin_token_env() -> String {
    "KONSUL_ADMIN_TOKEN".into()
}
