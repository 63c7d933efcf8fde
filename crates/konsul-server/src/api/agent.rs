//! `/v1/agent/*` handlers: registration, sync, batch updates, health
//! reports pushed up from `konsul-agent` instances (spec §6).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use konsul_core::model::{Capability, Resource, ResourceClass};
use konsul_protocol::{AgentInfo, BatchUpdateRequest, HealthUpdate, SyncRequest};

use super::kv::{check_rate_limit, error_body, require_capability};
use crate::state::AppState;

pub async fn register_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(info): Json<AgentInfo>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::class_scoped(ResourceClass::Service), Capability::Write) {
        return error_body(err).into_response();
    }
    state.coordinator.register_agent(info);
    axum::http::StatusCode::NO_CONTENT.into_response()
}

pub async fn sync_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::class_scoped(ResourceClass::Service), Capability::Read) {
        return error_body(err).into_response();
    }
    Json(state.coordinator.sync(request).await).into_response()
}

pub async fn batch_update_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<BatchUpdateRequest>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::class_scoped(ResourceClass::Service), Capability::Write) {
        return error_body(err).into_response();
    }
    Json(state.coordinator.batch_update(request).await).into_response()
}

pub async fn health_update_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(update): Json<HealthUpdate>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::class_scoped(ResourceClass::Health), Capability::Update) {
        return error_body(err).into_response();
    }
    state.coordinator.health_update(update);
    axum::http::StatusCode::NO_CONTENT.into_response()
}
