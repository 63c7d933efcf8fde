//! `/v1/watch` SSE endpoint (spec §4.5 "Watch stream", §6 wire format).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::Stream;
use konsul_core::model::{Capability, Resource, ResourceClass};
use konsul_protocol::WatchStreamEvent;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::kv::{check_rate_limit, error_body, require_capability};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    pub key: String,
}

/// Exact-key watches get a synthetic initial event from whichever store
/// owns the namespace; wildcard patterns start empty and wait for the
/// next publish.
fn initial_value(state: &AppState, pattern: &str) -> Option<Vec<u8>> {
    if pattern.contains('*') {
        return None;
    }
    if let Some(name) = pattern.strip_prefix("services/") {
        return state.coordinator.services().get(name).map(|s| serde_json::to_vec(&s).unwrap_or_default());
    }
    state.coordinator.kv().get(pattern)
}

fn watch_resource(pattern: &str) -> Resource<'_> {
    match pattern.strip_prefix("services/") {
        Some(name) if !name.is_empty() => Resource::service(name),
        Some(_) => Resource::class_scoped(ResourceClass::Service),
        None => Resource::kv(pattern),
    }
}

pub async fn watch(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    if let Err(err) = check_rate_limit(&state, &headers, Some(peer)) {
        return error_body(err).into_response();
    }
    if let Err(err) = require_capability(&state, &headers, watch_resource(&query.key), Capability::Read) {
        return error_body(err).into_response();
    }
    let initial = initial_value(&state, &query.key);
    let watcher = state.watch_manager.add_watcher(&query.key, initial);
    let stream = WatchEventStream { receiver: watcher.receiver, watch_manager: state.watch_manager.clone(), id: watcher.id };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))).into_response()
}

/// Removes the watcher registry entry once the SSE connection drops —
/// axum has no async drop, so the removal has to ride along the stream.
struct WatchEventStream {
    receiver: mpsc::Receiver<WatchStreamEvent>,
    watch_manager: std::sync::Arc<konsul_watch::WatchManager>,
    id: u64,
}

impl Stream for WatchEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                Poll::Ready(Some(Ok(Event::default().event(event.event_type.clone()).data(payload))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for WatchEventStream {
    fn drop(&mut self) {
        self.watch_manager.remove_watcher(self.id);
    }
}
