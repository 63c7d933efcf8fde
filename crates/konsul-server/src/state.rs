//! Shared application state threaded through every HTTP handler, grouped
//! by concern the same way the grounding repo's gateway `AppState` is.

use std::sync::Arc;

use konsul_acl::AclEvaluator;
use konsul_core::config::Config;
use konsul_health::HealthManager;
use konsul_ratelimit::RateLimiter;
use konsul_watch::WatchManager;

use crate::coordinator::ServerCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ServerCoordinator>,
    pub watch_manager: Arc<WatchManager>,
    pub acl: Arc<AclEvaluator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub health_manager: Arc<HealthManager>,
    pub config: Arc<Config>,
    /// Resolved once at startup from `server.admin_token_env`; `None`
    /// means admin routes run unauthenticated.
    pub admin_token: Option<String>,
}
