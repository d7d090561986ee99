// Snapshot fetcher: pulls recent audience history + dashboard summary once at startup and then
// every poll interval. Results go to the aggregator as one message; failures are logged and
// reported there, never fatal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::aggregator::Update;
use crate::config::BackendConfig;
use crate::models::{DashboardSummary, RawAudienceRecord, Sample};

pub const HISTORY_PATH: &str = "/audience/live";
pub const SUMMARY_PATH: &str = "/analytics/dashboard";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unauthorized (HTTP 401) from {url}")]
    Unauthorized { url: String },
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// History as fetched: valid samples in server order, plus how many records were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryBatch {
    pub samples: Vec<Sample>,
    pub malformed: usize,
}

/// One completed fetch tick. Either half may have failed independently.
#[derive(Debug)]
pub struct FetchOutcome {
    pub history: Result<HistoryBatch, FetchError>,
    pub summary: Result<DashboardSummary, FetchError>,
    pub completed_at: DateTime<Utc>,
}

/// Authoritative source of audience history and dashboard summary.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_history(&self) -> Result<HistoryBatch, FetchError>;
    async fn fetch_summary(&self) -> Result<DashboardSummary, FetchError>;
}

/// Backend responses come wrapped as `{"data": ...}`. A bare body is accepted only when there
/// is no `data` key, so a broken envelope never decodes as an empty default.
fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    let mut body: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    if body.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
        let message = body
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("no message");
        return Err(format!("backend reported failure: {message}"));
    }
    let data = body.as_object_mut().and_then(|o| o.remove("data"));
    let payload = match data {
        Some(serde_json::Value::Null) => return Err("response data is null".into()),
        Some(data) => data,
        None => body,
    };
    serde_json::from_value(payload).map_err(|e| e.to_string())
}

pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpSnapshotSource {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self.url(path);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::Unauthorized { url });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;
        decode_body(&bytes).map_err(|reason| FetchError::Decode { url, reason })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_history(&self) -> Result<HistoryBatch, FetchError> {
        let records: Vec<serde_json::Value> = self.get_json(HISTORY_PATH).await?;
        Ok(history_from_records(records))
    }

    async fn fetch_summary(&self) -> Result<DashboardSummary, FetchError> {
        self.get_json(SUMMARY_PATH).await
    }
}

/// Keeps server order; records that fail validation are counted and skipped.
pub fn history_from_records(records: Vec<serde_json::Value>) -> HistoryBatch {
    let mut batch = HistoryBatch {
        samples: Vec::with_capacity(records.len()),
        malformed: 0,
    };
    for record in records {
        let sample = serde_json::from_value::<RawAudienceRecord>(record)
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.to_sample());
        match sample {
            Ok(sample) => batch.samples.push(sample),
            Err(reason) => {
                debug!(reason = %reason, "skipping malformed history record");
                batch.malformed += 1;
            }
        }
    }
    batch
}

/// Runs both requests concurrently and logs whatever failed.
pub async fn fetch_once<S: SnapshotSource + ?Sized>(source: &S) -> FetchOutcome {
    let (history, summary) = tokio::join!(source.fetch_history(), source.fetch_summary());
    if let Err(e) = &history {
        warn!(error = %e, operation = "fetch_history", "audience history fetch failed");
    }
    if let Err(e) = &summary {
        warn!(error = %e, operation = "fetch_summary", "dashboard summary fetch failed");
    }
    if let Ok(batch) = &history
        && batch.malformed > 0
    {
        warn!(
            operation = "fetch_history",
            malformed = batch.malformed,
            kept = batch.samples.len(),
            "dropped malformed history records"
        );
    }
    FetchOutcome {
        history,
        summary,
        completed_at: Utc::now(),
    }
}

/// Spawns the periodic fetch task. The first fetch happens immediately.
/// Cancelling `cancel` stops the timer and abandons an in-flight fetch.
pub fn spawn<S>(
    source: Arc<S>,
    poll_interval: Duration,
    updates: mpsc::Sender<Update>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    S: SnapshotSource + ?Sized + 'static,
{
    tokio::spawn(run(source, poll_interval, updates, cancel))
}

#[instrument(
    name = "snapshot_fetcher",
    skip_all,
    fields(poll_interval_ms = poll_interval.as_millis() as u64)
)]
async fn run<S>(
    source: Arc<S>,
    poll_interval: Duration,
    updates: mpsc::Sender<Update>,
    cancel: CancellationToken,
) where
    S: SnapshotSource + ?Sized + 'static,
{
    let mut tick = interval(poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    outcome = fetch_once(source.as_ref()) => outcome,
                };
                if updates.send(Update::Fetched(outcome)).await.is_err() {
                    debug!("aggregator update channel closed");
                    break;
                }
            }
        }
    }
    debug!("Snapshot fetcher shutting down");
}
