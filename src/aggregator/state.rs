// Aggregator state: the only owner of the rolling window, live station state and the cached
// aggregate. `apply` is synchronous; the state loop calls it once per update in arrival order.

use chrono::{DateTime, Utc};

use super::Update;
use crate::aggregate::compute_aggregate;
use crate::live_channel::LiveEvent;
use crate::models::{
    AggregateSnapshot, ConnectionStatus, DashboardState, DashboardSummary, FetchStatus,
    LiveStationState, MutationKind,
};
use crate::window::RollingWindow;

/// Counters for the periodic stats log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub events_applied: u64,
    pub events_dropped: u64,
    pub samples_evicted: u64,
    pub fetches_ok: u64,
    pub fetch_failures: u64,
    pub history_records_dropped: u64,
    pub published: u64,
}

pub struct AggregatorState {
    window: RollingWindow,
    live: LiveStationState,
    summary: Option<DashboardSummary>,
    connection: ConnectionStatus,
    aggregate: AggregateSnapshot,
    fetch: FetchStatus,
    revision: u64,
    stats: AggregatorStats,
}

impl AggregatorState {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            window: RollingWindow::new(window_capacity),
            live: LiveStationState::new(),
            summary: None,
            connection: ConnectionStatus::Disconnected,
            aggregate: AggregateSnapshot::default(),
            fetch: FetchStatus::default(),
            revision: 0,
            stats: AggregatorStats::default(),
        }
    }

    /// Applies one update stamped with the current time. `None` means nothing to publish.
    pub fn apply(&mut self, update: Update) -> Option<MutationKind> {
        self.apply_at(update, Utc::now())
    }

    /// Same as `apply`; `now` stamps samples created from live audience events.
    pub fn apply_at(&mut self, update: Update, now: DateTime<Utc>) -> Option<MutationKind> {
        let kind = match update {
            Update::Connected => {
                self.connection = ConnectionStatus::Connected;
                MutationKind::Connected
            }
            Update::Disconnected { .. } => {
                // Window and live state stay as they are; consumers flag staleness from the status.
                self.connection = ConnectionStatus::Disconnected;
                MutationKind::Disconnected
            }
            Update::Event(LiveEvent::Audience(reading)) => {
                let sample = reading.to_sample(now);
                self.live.upsert(reading);
                self.stats.samples_evicted += self.window.push(sample) as u64;
                self.stats.events_applied += 1;
                MutationKind::AudienceAppended
            }
            Update::Event(LiveEvent::StationStatus(status)) => {
                self.live.set_station_status(status);
                self.stats.events_applied += 1;
                MutationKind::StationStatus
            }
            Update::Rejected { .. } => {
                self.stats.events_dropped += 1;
                return None;
            }
            Update::Fetched(outcome) => {
                self.fetch.loading = false;
                let mut errors = Vec::new();

                let kind = match outcome.history {
                    Ok(batch) => {
                        self.stats.history_records_dropped += batch.malformed as u64;
                        // Replace, not merge: samples appended live since the last fetch are discarded.
                        self.window.replace(batch.samples);
                        MutationKind::SnapshotReplaced
                    }
                    Err(e) => {
                        errors.push(e.to_string());
                        MutationKind::FetchFailed
                    }
                };
                match outcome.summary {
                    Ok(summary) => self.summary = Some(summary),
                    Err(e) => errors.push(e.to_string()),
                }

                if errors.is_empty() {
                    self.stats.fetches_ok += 1;
                    self.fetch.last_success_at = Some(outcome.completed_at);
                    self.fetch.last_error = None;
                    self.fetch.consecutive_failures = 0;
                } else {
                    self.stats.fetch_failures += 1;
                    self.fetch.last_error = Some(errors.join("; "));
                    self.fetch.consecutive_failures =
                        self.fetch.consecutive_failures.saturating_add(1);
                }
                kind
            }
        };
        self.recompute();
        Some(kind)
    }

    fn recompute(&mut self) {
        self.aggregate = compute_aggregate(&self.live, self.summary.as_ref(), self.connection);
    }

    /// Complete read model for one publish; bumps the revision.
    pub fn snapshot(&mut self, cause: MutationKind) -> DashboardState {
        self.revision += 1;
        self.stats.published += 1;
        DashboardState {
            revision: self.revision,
            cause,
            window: self.window.to_vec(),
            stations: self.live.clone(),
            aggregate: self.aggregate.clone(),
            fetch: self.fetch.clone(),
        }
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn live(&self) -> &LiveStationState {
        &self.live
    }

    pub fn aggregate(&self) -> &AggregateSnapshot {
        &self.aggregate
    }

    pub fn fetch_status(&self) -> &FetchStatus {
        &self.fetch
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }
}
