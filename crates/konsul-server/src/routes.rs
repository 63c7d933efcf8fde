//! Router assembly: public surface (catalog reads, health probe), the
//! agent-facing sync surface, and the admin surface gated behind
//! `require_admin_token`.

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{acl, agent, auth, kv, ratelimit, services, watch};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/v1/status/leader", get(|| async { "ok" }))
        .route("/v1/catalog/service/:name", get(services::get_service))
        .route("/v1/catalog/services", get(services::list_services))
        .route("/v1/kv/*key", get(kv::get_kv))
        .route("/v1/kv", get(kv::list_kv))
        .route("/v1/watch", get(watch::watch));

    let agent_surface = Router::new()
        .route("/v1/agent/register", post(agent::register_agent))
        .route("/v1/agent/sync", post(agent::sync_agent))
        .route("/v1/agent/batch_update", post(agent::batch_update_agent))
        .route("/v1/agent/health_update", post(agent::health_update_agent))
        .route("/v1/agent/service/register", post(services::register_service))
        .route("/v1/agent/service/:name", delete(services::deregister_service))
        .route("/v1/agent/service/:name/heartbeat", put(services::heartbeat_service))
        .route("/v1/kv/*key", put(kv::put_kv))
        .route("/v1/kv/*key", delete(kv::delete_kv));

    let admin = Router::new()
        .route("/v1/acl/policy", post(acl::add_policy))
        .route("/v1/acl/policy", get(acl::list_policies))
        .route("/v1/acl/policy/:name", get(acl::get_policy))
        .route("/v1/acl/policy/:name", put(acl::update_policy))
        .route("/v1/acl/policy/:name", delete(acl::delete_policy))
        .route("/v1/ratelimit/stats", get(ratelimit::stats))
        .route("/v1/ratelimit/active", get(ratelimit::list_active))
        .route("/v1/ratelimit/client/:kind/:identifier", get(ratelimit::client_status))
        .route("/v1/ratelimit/config", put(ratelimit::update_config))
        .route("/v1/ratelimit/custom", post(ratelimit::set_custom))
        .route("/v1/ratelimit/allow", post(ratelimit::allow))
        .route("/v1/ratelimit/deny", post(ratelimit::deny))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin_token));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(agent_surface)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
