// Aggregator: one instance owns all telemetry state. The snapshot fetcher and the live channel run
// as independent tasks and only post `Update`s; a single state loop applies them in arrival order
// and publishes one DashboardState per mutation.

mod state;

pub use state::{AggregatorState, AggregatorStats};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::fetcher::{self, FetchOutcome, SnapshotSource};
use crate::live_channel::{self, LiveChannelConfig, LiveEvent};
use crate::publisher::{self, DashboardReader, StatePublisher};

/// Updates queued between the feeds and the state loop before feeds wait.
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Everything the state loop can be told.
#[derive(Debug)]
pub enum Update {
    Connected,
    Disconnected { reason: String },
    Event(LiveEvent),
    /// A live frame that failed validation; counted, never applied.
    Rejected { reason: String },
    Fetched(FetchOutcome),
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub poll_interval: Duration,
    pub window_capacity: usize,
    pub broadcast_capacity: usize,
    pub stats_log_interval: Duration,
    pub live: LiveChannelConfig,
}

impl From<&AppConfig> for AggregatorConfig {
    fn from(c: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(c.aggregator.poll_interval_ms),
            window_capacity: c.aggregator.window_capacity,
            broadcast_capacity: c.aggregator.broadcast_capacity,
            stats_log_interval: Duration::from_secs(c.monitoring.stats_log_interval_secs),
            live: LiveChannelConfig::from(&c.live),
        }
    }
}

/// Running aggregator. Dropping it without `shutdown` leaves the tasks running.
pub struct AggregatorHandle {
    reader: DashboardReader,
    cancel: CancellationToken,
    fetcher: tokio::task::JoinHandle<()>,
    channel: tokio::task::JoinHandle<()>,
    state_loop: tokio::task::JoinHandle<AggregatorStats>,
}

/// Starts fetcher, live channel and state loop.
pub fn start<S>(config: AggregatorConfig, source: Arc<S>) -> AggregatorHandle
where
    S: SnapshotSource + ?Sized + 'static,
{
    let cancel = CancellationToken::new();
    let (publisher, reader) = publisher::channel(config.broadcast_capacity);
    let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

    let state_loop = spawn_state_loop(
        config.window_capacity,
        publisher,
        updates_rx,
        config.stats_log_interval,
        cancel.clone(),
    );
    let fetcher = fetcher::spawn(
        source,
        config.poll_interval,
        updates_tx.clone(),
        cancel.clone(),
    );
    let channel = live_channel::spawn(config.live.clone(), updates_tx, cancel.clone());

    info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        window_capacity = config.window_capacity,
        endpoint = %config.live.endpoint_url,
        "Aggregator started"
    );

    AggregatorHandle {
        reader,
        cancel,
        fetcher,
        channel,
        state_loop,
    }
}

impl AggregatorHandle {
    pub fn reader(&self) -> DashboardReader {
        self.reader.clone()
    }

    /// Cancels the fetch timer and the live channel (no more reconnects), stops notifications,
    /// and waits for all three tasks. Returns the final counters.
    pub async fn shutdown(self) -> AggregatorStats {
        self.cancel.cancel();
        if let Err(e) = self.fetcher.await {
            warn!(error = %e, "snapshot fetcher task failed");
        }
        if let Err(e) = self.channel.await {
            warn!(error = %e, "live channel task failed");
        }
        match self.state_loop.await {
            Ok(stats) => {
                info!(?stats, "Aggregator stopped");
                stats
            }
            Err(e) => {
                warn!(error = %e, "aggregator state loop failed");
                AggregatorStats::default()
            }
        }
    }
}

/// Spawns the single consumer of `updates`. The publisher is closed when the loop ends
/// (cancellation or every feed gone), so no notification follows shutdown.
pub fn spawn_state_loop(
    window_capacity: usize,
    publisher: StatePublisher,
    updates: mpsc::Receiver<Update>,
    stats_log_interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<AggregatorStats> {
    tokio::spawn(run_state_loop(
        AggregatorState::new(window_capacity),
        publisher,
        updates,
        stats_log_interval,
        cancel,
    ))
}

#[instrument(name = "aggregator", skip_all, fields(window_capacity = state.window().capacity()))]
async fn run_state_loop(
    mut state: AggregatorState,
    mut publisher: StatePublisher,
    mut updates: mpsc::Receiver<Update>,
    stats_log_interval: Duration,
    cancel: CancellationToken,
) -> AggregatorStats {
    let mut stats_log_tick = interval(stats_log_interval);
    stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            update = updates.recv() => {
                let Some(update) = update else {
                    debug!("all feeds closed");
                    break;
                };
                if let Some(kind) = state.apply(update) {
                    publisher.publish(state.snapshot(kind));
                }
            }
            _ = stats_log_tick.tick() => {
                let stats = state.stats();
                info!(
                    window_len = state.window().len(),
                    stations = state.live().station_count(),
                    connected = state.connection_status().is_connected(),
                    events_applied = stats.events_applied,
                    events_dropped = stats.events_dropped,
                    fetch_failures = stats.fetch_failures,
                    subscribers = publisher.subscriber_count(),
                    "aggregator stats"
                );
            }
        }
    }

    publisher.close();
    debug!("Aggregator state loop shutting down");
    state.stats().clone()
}
