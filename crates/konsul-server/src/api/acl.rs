//! `/v1/acl/policy/*` admin handlers (spec §4.6), gated by
//! `require_admin_token`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use konsul_core::model::Policy;

use super::kv::error_body;
use crate::state::AppState;

pub async fn add_policy(State(state): State<AppState>, Json(policy): Json<Policy>) -> impl IntoResponse {
    match state.acl.add_policy(policy) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

pub async fn update_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut policy): Json<Policy>,
) -> impl IntoResponse {
    policy.name = name;
    match state.acl.update_policy(policy) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

pub async fn delete_policy(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.acl.delete_policy(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_body(err).into_response(),
    }
}

pub async fn get_policy(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.acl.get_policy(&name) {
        Some(policy) => Json(policy).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn list_policies(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.acl.list_policies())
}
