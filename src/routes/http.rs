// GET handlers: version and point reads of the dashboard state

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use super::AppState;
use crate::models::{AggregateSnapshot, FetchStatus};
use crate::version::{NAME, VERSION};

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// Summary counters plus fetch health, so a consumer can flag stale numbers.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardResponse {
    revision: u64,
    #[serde(flatten)]
    aggregate: AggregateSnapshot,
    fetch: FetchStatus,
}

/// GET /api/dashboard
pub(super) async fn dashboard_handler(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.reader.current();
    Json(DashboardResponse {
        revision: current.revision,
        aggregate: current.aggregate.clone(),
        fetch: current.fetch.clone(),
    })
}

/// GET /api/audience/window: rolling window, oldest first.
pub(super) async fn window_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.reader.rolling_window())
}

/// GET /api/state: whole read model.
pub(super) async fn state_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.reader.current().as_ref().clone())
}
