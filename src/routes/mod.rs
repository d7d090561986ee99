// HTTP + WebSocket read model for dashboard consumers

mod http;
mod ws;

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::publisher::DashboardReader;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) reader: DashboardReader,
}

pub fn app(reader: DashboardReader) -> Router {
    let state = AppState { reader };
    Router::new()
        .route("/", get(|| async { "SignalSense live audience aggregator" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/dashboard", get(http::dashboard_handler)) // GET /api/dashboard
        .route("/api/audience/window", get(http::window_handler)) // GET /api/audience/window
        .route("/api/state", get(http::state_handler)) // GET /api/state
        .route("/ws/dashboard", get(ws::ws_dashboard)) // WS /ws/dashboard
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
