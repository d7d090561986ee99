// Shared test helpers: sample builders, fake snapshot source, fake HTTP backend, fake live server
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, TimeZone, Utc};
use signalsense::fetcher::{FetchError, HistoryBatch, SnapshotSource};
use signalsense::live_channel::LiveChannelConfig;
use signalsense::models::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn sample(secs: i64, station_id: &str, audience_type: AudienceType, count: u64) -> Sample {
    Sample::new(ts(secs), station_id, audience_type, count)
}

pub fn reading(station_id: &str, audience_type: AudienceType, count: u64) -> StationReading {
    StationReading {
        station_id: station_id.into(),
        audience_type,
        audience_count: count,
    }
}

/// Polls `f` every 10 ms for up to 3 s.
pub async fn wait_until(what: &str, mut f: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !f() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn live_config(endpoint_url: &str) -> LiveChannelConfig {
    LiveChannelConfig {
        endpoint_url: endpoint_url.into(),
        join_event: "joinDashboard".into(),
        reconnect_delay: Duration::from_millis(10),
        reconnect_delay_max: Duration::from_millis(40),
        randomization_factor: 0.0,
        connect_timeout: Duration::from_secs(2),
    }
}

// --- Fake snapshot source ---

pub struct FakeSource {
    pub history: Mutex<Result<Vec<Sample>, u16>>,
    pub summary: Mutex<Result<DashboardSummary, u16>>,
    pub history_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(history: Vec<Sample>, summary: DashboardSummary) -> Self {
        Self {
            history: Mutex::new(Ok(history)),
            summary: Mutex::new(Ok(summary)),
            history_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_history(&self, history: Result<Vec<Sample>, u16>) {
        *self.history.lock().unwrap() = history;
    }

    pub fn calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for FakeSource {
    async fn fetch_history(&self) -> Result<HistoryBatch, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let history = self.history.lock().unwrap().clone();
        match history {
            Ok(samples) => Ok(HistoryBatch {
                samples,
                malformed: 0,
            }),
            Err(status) => Err(FetchError::Status {
                status,
                url: "fake://history".into(),
            }),
        }
    }

    async fn fetch_summary(&self) -> Result<DashboardSummary, FetchError> {
        let summary = self.summary.lock().unwrap().clone();
        match summary {
            Ok(summary) => Ok(summary),
            Err(status) => Err(FetchError::Status {
                status,
                url: "fake://summary".into(),
            }),
        }
    }
}

// --- Fake REST backend (axum on an ephemeral port) ---

#[derive(Clone)]
pub struct BackendState {
    pub history: Arc<Mutex<(StatusCode, serde_json::Value)>>,
    pub summary: Arc<Mutex<(StatusCode, serde_json::Value)>>,
    pub last_auth: Arc<Mutex<Option<String>>>,
}

pub struct FakeBackend {
    pub base_url: String,
    pub state: BackendState,
}

async fn history_handler(State(s): State<BackendState>, headers: HeaderMap) -> impl IntoResponse {
    *s.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let (status, body) = s.history.lock().unwrap().clone();
    (status, Json(body))
}

async fn summary_handler(State(s): State<BackendState>) -> impl IntoResponse {
    let (status, body) = s.summary.lock().unwrap().clone();
    (status, Json(body))
}

pub async fn spawn_backend(history: serde_json::Value, summary: serde_json::Value) -> FakeBackend {
    let state = BackendState {
        history: Arc::new(Mutex::new((StatusCode::OK, history))),
        summary: Arc::new(Mutex::new((StatusCode::OK, summary))),
        last_auth: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/api/v1/audience/live", get(history_handler))
        .route("/api/v1/analytics/dashboard", get(summary_handler))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    FakeBackend {
        base_url: format!("http://{addr}/api/v1"),
        state,
    }
}

// --- Fake live telemetry server (axum WebSocket on an ephemeral port) ---

#[derive(Debug, Clone)]
pub enum ServerFrame {
    Text(String),
    /// Close the current connection (the client is expected to reconnect).
    Close,
}

#[derive(Clone)]
struct LiveState {
    frames: broadcast::Sender<ServerFrame>,
    joins: mpsc::UnboundedSender<String>,
    connections: Arc<AtomicUsize>,
}

pub struct FakeLiveServer {
    pub url: String,
    pub frames: broadcast::Sender<ServerFrame>,
    pub joins: mpsc::UnboundedReceiver<String>,
    pub connections: Arc<AtomicUsize>,
}

impl FakeLiveServer {
    /// Waits for the next client handshake; frames sent after this reach that client.
    pub async fn next_join(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(3), self.joins.recv())
            .await
            .expect("timed out waiting for join handshake")
            .expect("live server gone")
    }

    pub fn send(&self, text: impl Into<String>) {
        let _ = self.frames.send(ServerFrame::Text(text.into()));
    }

    pub fn close_connection(&self) {
        let _ = self.frames.send(ServerFrame::Close);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn live_handler(ws: WebSocketUpgrade, State(state): State<LiveState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_live(socket, state))
}

async fn serve_live(mut socket: WebSocket, state: LiveState) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let mut frames = state.frames.subscribe();

    // First client frame is the join handshake.
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                let _ = state.joins.send(text.as_str().to_owned());
                break;
            }
            Some(Ok(_)) => continue,
            _ => return,
        }
    }

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(ServerFrame::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Ok(ServerFrame::Close) => {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
                Err(_) => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => {}
                _ => return,
            },
        }
    }
}

pub async fn spawn_live_server() -> FakeLiveServer {
    let (frames, _) = broadcast::channel(64);
    let (joins_tx, joins_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));
    let state = LiveState {
        frames: frames.clone(),
        joins: joins_tx,
        connections: connections.clone(),
    };
    let app = Router::new()
        .route("/live", get(live_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    FakeLiveServer {
        url: format!("ws://{addr}/live"),
        frames,
        joins: joins_rx,
        connections,
    }
}

pub fn audience_frame(station_id: &str, kind: &str, audience: u64) -> String {
    serde_json::json!({
        "event": "audienceUpdate",
        "data": { "stationId": station_id, "type": kind, "audience": audience }
    })
    .to_string()
}
