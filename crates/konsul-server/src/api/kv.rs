//! `/v1/kv/*key` handlers (spec §6 "CAS semantics across the wire").

use std::collections::HashMap;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use konsul_core::error::Error;
use konsul_core::model::{Capability, Resource};
use konsul_ratelimit::{Decision, IdentifierKind};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WriteQuery {
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub cas: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct KVResponse {
    pub key: String,
    pub value: String,
    pub flags: u64,
    pub create_index: u64,
    pub modify_index: u64,
}

pub fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) | Error::CasConflict { .. } => StatusCode::CONFLICT,
        Error::NotLeader { .. } => StatusCode::CONFLICT,
        Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Io(_) | Error::Json(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_body(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = error_status(&err);
    let mut body = serde_json::json!({ "error": err.kind(), "message": err.to_string() });
    if let Error::NotLeader { leader_addr } = &err {
        body["leader_addr"] = serde_json::json!(leader_addr);
    }
    (status, Json(body))
}

/// Resolves the capability set a request presents: `X-Konsul-Policies`
/// (comma-separated policy names) when set, else `acl.default_policies`
/// (spec §4.6 "anonymous / default token").
pub fn policy_names(headers: &HeaderMap, state: &AppState) -> Vec<String> {
    match headers.get("x-konsul-policies").and_then(|v| v.to_str().ok()) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
        }
        _ => state.config.acl.default_policies.clone(),
    }
}

/// Evaluates the request's policy set against `resource`/`capability`,
/// returning `Error::Forbidden` on denial (spec §4.6 deny-by-default).
pub fn require_capability(
    state: &AppState,
    headers: &HeaderMap,
    resource: Resource<'_>,
    capability: Capability,
) -> Result<(), Error> {
    let names = policy_names(headers, state);
    if state.acl.evaluate(&names, &resource, capability) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("{capability:?} denied for {:?}", resource.class)))
    }
}

/// Per-client token-bucket check (spec §4.7): API key (`X-Konsul-Token`)
/// takes precedence over the peer IP when present.
pub fn check_rate_limit(state: &AppState, headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<(), Error> {
    if !state.config.rate_limit.enabled {
        return Ok(());
    }
    let api_key = headers.get("x-konsul-token").and_then(|v| v.to_str().ok()).filter(|t| !t.is_empty());
    let (kind, identifier) = match api_key {
        Some(key) => (IdentifierKind::ApiKey, key.to_string()),
        None => (IdentifierKind::Ip, peer.map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_string())),
    };
    match state.rate_limiter.check(kind, &identifier) {
        Decision::Allow { .. } => Ok(()),
        Decision::Deny { reason } => Err(Error::RateLimited(reason.to_string())),
    }
}

pub async fn get_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::kv(&key), Capability::Read) {
        return error_body(err).into_response();
    }
    match state.coordinator.kv().get_entry(&key) {
        Some(entry) => Json(KVResponse {
            key,
            value: String::from_utf8_lossy(&entry.value).to_string(),
            flags: entry.flags,
            create_index: entry.create_index,
            modify_index: entry.modify_index,
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn put_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<WriteQuery>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::kv(&key), Capability::Write) {
        return error_body(err).into_response();
    }
    let result = match query.cas {
        Some(expected) => state.coordinator.kv_set_cas(&key, body.to_vec(), query.flags, expected).await,
        None => state.coordinator.kv_set(&key, body.to_vec(), query.flags).await,
    };
    match result {
        Ok(modify_index) => Json(serde_json::json!({ "modify_index": modify_index })).into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

pub async fn delete_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<WriteQuery>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, Resource::kv(&key), Capability::Delete) {
        return error_body(err).into_response();
    }
    let result = match query.cas {
        Some(expected) => state.coordinator.kv_delete_cas(&key, expected).await,
        None => state.coordinator.kv_delete(&key).await,
    };
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: Option<String>,
}

pub async fn list_kv(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    let scope = query.prefix.clone().unwrap_or_default();
    if let Err(err) = require_capability(&state, &headers, Resource::kv(&scope), Capability::List) {
        return error_body(err).into_response();
    }
    let prefixes: Vec<String> = query.prefix.into_iter().collect();
    let entries: HashMap<String, KVResponse> = state
        .coordinator
        .kv()
        .list_under(&prefixes)
        .into_iter()
        .map(|(key, entry)| {
            (
                key.clone(),
                KVResponse {
                    key,
                    value: String::from_utf8_lossy(&entry.value).to_string(),
                    flags: entry.flags,
                    create_index: entry.create_index,
                    modify_index: entry.modify_index,
                },
            )
        })
        .collect();
    Json(entries).into_response()
}
