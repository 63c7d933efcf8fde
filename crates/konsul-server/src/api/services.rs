//! `/v1/catalog/*` and `/v1/agent/service/*` handlers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use konsul_core::model::{Capability, Resource, ResourceClass, Service};
use serde::Deserialize;

use super::kv::{check_rate_limit, error_body, require_capability};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(flatten)]
    pub service: Service,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub cas: Option<u64>,
}

pub async fn register_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::service(&req.service.name), Capability::Create) {
        return error_body(err).into_response();
    }
    let result = match req.cas {
        Some(expected) => state.coordinator.service_register_cas(req.service, req.ttl_seconds, expected).await,
        None => state.coordinator.service_register(req.service, req.ttl_seconds).await,
    };
    match result {
        Ok(modify_index) => Json(serde_json::json!({ "modify_index": modify_index })).into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeregisterQuery {
    #[serde(default)]
    pub cas: Option<u64>,
}

pub async fn deregister_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeregisterQuery>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::service(&name), Capability::Delete) {
        return error_body(err).into_response();
    }
    let result = match query.cas {
        Some(expected) => state.coordinator.service_deregister_cas(&name, expected).await,
        None => state.coordinator.service_deregister(&name).await,
    };
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatQuery {
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

pub async fn heartbeat_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HeartbeatQuery>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::service(&name), Capability::Update) {
        return error_body(err).into_response();
    }
    match state.coordinator.service_heartbeat(&name, query.ttl_seconds).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::service(&name), Capability::Read) {
        return error_body(err).into_response();
    }
    match state.coordinator.services().get_entry(&name) {
        Some(entry) => Json(entry).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryFilters {
    #[serde(default)]
    pub tag: Vec<String>,
    #[serde(default)]
    pub meta: Vec<String>,
}

pub async fn list_services(
    State(state): State<AppState>,
    Query(filters): Query<QueryFilters>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::class_scoped(ResourceClass::Service), Capability::List) {
        return error_body(err).into_response();
    }
    let meta_filters: Vec<(String, String)> = filters
        .meta
        .iter()
        .filter_map(|kv| kv.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect();
    let entries = if filters.tag.is_empty() && meta_filters.is_empty() {
        state.coordinator.services().list()
    } else {
        state.coordinator.services().query_by_tags_and_metadata(&filters.tag, &meta_filters)
    };
    Json(entries).into_response()
}
