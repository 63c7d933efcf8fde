//! `/v1/ratelimit/*` admin handlers (spec §4.7), gated by
//! `require_admin_token`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use konsul_ratelimit::IdentifierKind;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

fn parse_kind(raw: &str) -> Option<IdentifierKind> {
    match raw {
        "ip" => Some(IdentifierKind::Ip),
        "api_key" => Some(IdentifierKind::ApiKey),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub ip_buckets: usize,
    pub api_key_buckets: usize,
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let (ip, key) = state.rate_limiter.stats();
    Json(Stats { ip_buckets: ip, api_key_buckets: key })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub kind: Option<String>,
}

pub async fn list_active(State(state): State<AppState>, Query(query): Query<ListQuery>) -> impl IntoResponse {
    let kind = query.kind.as_deref().and_then(parse_kind);
    Json(state.rate_limiter.list_active(kind))
}

#[derive(Debug, Serialize)]
pub struct ClientStatusResponse {
    pub identifier: String,
    pub tokens: f64,
    pub last_request_at: chrono::DateTime<chrono::Utc>,
    pub custom: Option<(f64, f64, chrono::DateTime<chrono::Utc>)>,
}

pub async fn client_status(
    State(state): State<AppState>,
    Path((kind, identifier)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(kind) = parse_kind(&kind) else { return StatusCode::BAD_REQUEST.into_response() };
    match state.rate_limiter.client_status(kind, &identifier) {
        Some(status) => Json(ClientStatusResponse {
            identifier: status.identifier,
            tokens: status.tokens,
            last_request_at: status.last_request_at,
            custom: status.custom,
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub burst: Option<f64>,
}

pub async fn update_config(State(state): State<AppState>, Json(update): Json<ConfigUpdate>) -> impl IntoResponse {
    state.rate_limiter.update_config(update.rate, update.burst);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct CustomLimit {
    pub identifier: String,
    pub rate: f64,
    pub burst: f64,
    pub duration_seconds: u64,
}

pub async fn set_custom(State(state): State<AppState>, Json(req): Json<CustomLimit>) -> impl IntoResponse {
    state.rate_limiter.set_custom(&req.identifier, req.rate, req.burst, std::time::Duration::from_secs(req.duration_seconds));
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct ListMutation {
    pub identifier: String,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

pub async fn allow(State(state): State<AppState>, Json(req): Json<ListMutation>) -> impl IntoResponse {
    state.rate_limiter.allow(&req.identifier, req.ttl_seconds.map(std::time::Duration::from_secs));
    StatusCode::NO_CONTENT
}

pub async fn deny(State(state): State<AppState>, Json(req): Json<ListMutation>) -> impl IntoResponse {
    state.rate_limiter.deny(&req.identifier, req.ttl_seconds.map(std::time::Duration::from_secs));
    StatusCode::NO_CONTENT
}
