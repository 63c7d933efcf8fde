//! Local operational surface (spec §4.10): `/healthz` and `/stats`, bound to
//! `AgentConfig.bind_address`. Read-only, unauthenticated — scoped to
//! localhost/loopback deployments the way the agent itself is.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::runtime::AgentRuntime;

async fn healthz(State(runtime): State<Arc<AgentRuntime>>) -> impl IntoResponse {
    let health = runtime.health();
    let status = if health.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(health))
}

async fn stats(State(runtime): State<Arc<AgentRuntime>>) -> impl IntoResponse {
    Json(runtime.stats())
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(runtime)
}
