// Aggregate calculator: pure recomputation of dashboard counters from live state.

use crate::models::{
    AggregateSnapshot, AudienceType, ConnectionStatus, DashboardSummary, LiveStationState,
};

/// Fresh sum over every station entry; the station-status slot is never counted.
/// `activeStations`/`trendingPrograms` come from the last successful summary fetch.
pub fn compute_aggregate(
    live: &LiveStationState,
    summary: Option<&DashboardSummary>,
    connection_status: ConnectionStatus,
) -> AggregateSnapshot {
    AggregateSnapshot {
        total_listeners: total_for(live, AudienceType::Radio),
        total_viewers: total_for(live, AudienceType::Tv),
        active_stations: summary.map(|s| s.active_stations).unwrap_or(0),
        trending_programs: summary.map(|s| s.trending_programs).unwrap_or(0),
        connection_status,
    }
}

/// Saturating sum of `audience_count` over stations of one audience type.
pub fn total_for(live: &LiveStationState, audience_type: AudienceType) -> u64 {
    live.stations()
        .filter(|r| r.audience_type == audience_type)
        .fold(0u64, |acc, r| acc.saturating_add(r.audience_count))
}
