// WebSocket /ws/dashboard: current state on connect, then every published state

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::DashboardState;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn ws_dashboard(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let reader = state.reader.clone();
    ws.on_upgrade(move |socket| async move {
        // Subscribe before reading `current` so nothing published in between is missed.
        let mut rx = reader.subscribe();
        let initial = reader.current();
        if let Err(e) = stream_dashboard(socket, initial, &mut rx).await {
            tracing::info!("Dashboard stream error: {}", e);
        }
    })
}

/// Sends one JSON text frame; false when the client is gone or too slow.
async fn send_state(socket: &mut WebSocket, state: &DashboardState) -> anyhow::Result<bool> {
    let json = serde_json::to_string(state)?;
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    Ok(matches!(r, Ok(Ok(()))))
}

async fn stream_dashboard(
    mut socket: WebSocket,
    initial: Arc<DashboardState>,
    rx: &mut broadcast::Receiver<Arc<DashboardState>>,
) -> anyhow::Result<()> {
    tracing::info!("Client connected to dashboard stream");
    let mut last_revision = initial.revision;
    if !send_state(&mut socket, &initial).await? {
        return Ok(());
    }

    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(state) => {
                        // Already covered by the initial frame.
                        if state.revision <= last_revision {
                            continue;
                        }
                        last_revision = state.revision;
                        if !send_state(&mut socket, &state).await? {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            "WebSocket /ws/dashboard client lagged, skipped {} states",
                            n
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!("Client disconnected from dashboard stream");
    Ok(())
}
