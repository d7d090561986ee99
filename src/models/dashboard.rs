// Derived metrics and the published read snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LiveStationState, Sample};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Summary counters from `GET /analytics/dashboard`.
/// Only `active_stations` and `trending_programs` feed the aggregate; totals come from live state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    #[serde(default)]
    pub total_listeners: u64,
    #[serde(default)]
    pub total_viewers: u64,
    #[serde(default)]
    pub active_stations: u64,
    #[serde(default)]
    pub trending_programs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    pub total_listeners: u64,
    pub total_viewers: u64,
    pub active_stations: u64,
    pub trending_programs: u64,
    pub connection_status: ConnectionStatus,
}

/// Snapshot fetcher health, for consumers that flag stale data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatus {
    /// True until the first fetch completes (either way).
    pub loading: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl Default for FetchStatus {
    fn default() -> Self {
        Self {
            loading: true,
            last_success_at: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Which mutation produced a published state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Initial,
    SnapshotReplaced,
    FetchFailed,
    AudienceAppended,
    StationStatus,
    Connected,
    Disconnected,
}

/// Immutable read model handed to consumers; one per mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub revision: u64,
    pub cause: MutationKind,
    pub window: Vec<Sample>,
    pub stations: LiveStationState,
    pub aggregate: AggregateSnapshot,
    pub fetch: FetchStatus,
}

impl DashboardState {
    pub fn initial() -> Self {
        Self {
            revision: 0,
            cause: MutationKind::Initial,
            window: Vec::new(),
            stations: LiveStationState::new(),
            aggregate: AggregateSnapshot::default(),
            fetch: FetchStatus::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.aggregate.connection_status.is_connected()
    }
}
