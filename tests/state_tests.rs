// Aggregator state machine: merge order, replace-not-merge, staleness, status events

mod common;

use chrono::Utc;
use common::{reading, sample, ts};
use signalsense::aggregator::{AggregatorState, Update};
use signalsense::fetcher::{FetchError, FetchOutcome, HistoryBatch};
use signalsense::live_channel::LiveEvent;
use signalsense::models::AudienceType::{Radio, Tv};
use signalsense::models::*;

fn audience(id: &str, kind: AudienceType, count: u64) -> Update {
    Update::Event(LiveEvent::Audience(reading(id, kind, count)))
}

fn fetched(samples: Vec<Sample>, summary: DashboardSummary) -> Update {
    Update::Fetched(FetchOutcome {
        history: Ok(HistoryBatch {
            samples,
            malformed: 0,
        }),
        summary: Ok(summary),
        completed_at: Utc::now(),
    })
}

fn failed_fetch() -> Update {
    Update::Fetched(FetchOutcome {
        history: Err(FetchError::Status {
            status: 503,
            url: "http://backend/audience/live".into(),
        }),
        summary: Err(FetchError::Unauthorized {
            url: "http://backend/analytics/dashboard".into(),
        }),
        completed_at: Utc::now(),
    })
}

#[test]
fn two_pushes_give_listener_and_viewer_totals() {
    let mut state = AggregatorState::new(50);
    state.apply(Update::Connected);
    state.apply(audience("r1", Radio, 1000));
    state.apply(audience("t1", Tv, 500));

    assert_eq!(state.aggregate().total_listeners, 1000);
    assert_eq!(state.aggregate().total_viewers, 500);
    assert_eq!(state.window().len(), 2);
}

#[test]
fn push_appends_sample_stamped_with_arrival_time() {
    let mut state = AggregatorState::new(50);
    let kind = state.apply_at(audience("r1", Radio, 10), ts(42));
    assert_eq!(kind, Some(MutationKind::AudienceAppended));
    let latest = state.window().latest().unwrap();
    assert_eq!(latest.timestamp(), ts(42));
    assert_eq!(latest.station_id(), "r1");
    assert_eq!(latest.audience_count(), 10);
}

#[test]
fn push_appends_are_bounded_fifo() {
    let mut state = AggregatorState::new(3);
    for id in ["A", "B", "C", "D", "E"] {
        state.apply(audience(id, Radio, 1));
        assert!(state.window().len() <= 3);
    }
    let ids: Vec<&str> = state.window().iter().map(|s| s.station_id()).collect();
    assert_eq!(ids, vec!["C", "D", "E"]);
    assert_eq!(state.stats().samples_evicted, 2);
}

#[test]
fn snapshot_fetch_replaces_live_appended_samples() {
    let mut state = AggregatorState::new(50);
    state.apply(audience("live1", Radio, 1));
    state.apply(audience("live2", Tv, 2));
    assert_eq!(state.window().len(), 2);

    let history: Vec<Sample> = (0..4).map(|i| sample(i, &format!("h{i}"), Radio, 9)).collect();
    let kind = state.apply(fetched(history.clone(), DashboardSummary::default()));

    assert_eq!(kind, Some(MutationKind::SnapshotReplaced));
    assert_eq!(state.window().len(), 4);
    assert_eq!(state.window().to_vec(), history);
}

#[test]
fn snapshot_fetch_does_not_touch_live_totals() {
    let mut state = AggregatorState::new(50);
    state.apply(audience("r1", Radio, 300));
    state.apply(fetched(
        vec![sample(0, "r1", Radio, 1)],
        DashboardSummary {
            total_listeners: 9_999,
            total_viewers: 9_999,
            active_stations: 8,
            trending_programs: 3,
        },
    ));
    let agg = state.aggregate();
    assert_eq!(agg.total_listeners, 300);
    assert_eq!(agg.total_viewers, 0);
    assert_eq!(agg.active_stations, 8);
    assert_eq!(agg.trending_programs, 3);
}

#[test]
fn push_after_fetch_appends_to_fetched_window() {
    let mut state = AggregatorState::new(50);
    state.apply(fetched(
        vec![sample(0, "h0", Radio, 1), sample(1, "h1", Radio, 1)],
        DashboardSummary::default(),
    ));
    state.apply(audience("live", Tv, 5));
    let ids: Vec<&str> = state.window().iter().map(|s| s.station_id()).collect();
    assert_eq!(ids, vec!["h0", "h1", "live"]);
}

#[test]
fn failed_fetch_leaves_window_and_records_error() {
    let mut state = AggregatorState::new(50);
    state.apply(audience("r1", Radio, 1));
    let before = state.window().to_vec();

    let kind = state.apply(failed_fetch());
    assert_eq!(kind, Some(MutationKind::FetchFailed));
    assert_eq!(state.window().to_vec(), before);

    let fetch = state.fetch_status();
    assert!(!fetch.loading);
    assert_eq!(fetch.consecutive_failures, 1);
    let err = fetch.last_error.as_deref().unwrap();
    assert!(err.contains("503"));
    assert!(err.contains("unauthorized"));

    state.apply(failed_fetch());
    assert_eq!(state.fetch_status().consecutive_failures, 2);
    assert_eq!(state.stats().fetch_failures, 2);
}

#[test]
fn successful_fetch_clears_failure_record() {
    let mut state = AggregatorState::new(50);
    state.apply(failed_fetch());
    state.apply(fetched(Vec::new(), DashboardSummary::default()));
    let fetch = state.fetch_status();
    assert_eq!(fetch.consecutive_failures, 0);
    assert!(fetch.last_error.is_none());
    assert!(fetch.last_success_at.is_some());
}

#[test]
fn partial_fetch_applies_the_half_that_succeeded() {
    let mut state = AggregatorState::new(50);
    state.apply(fetched(
        Vec::new(),
        DashboardSummary {
            active_stations: 5,
            ..Default::default()
        },
    ));
    let kind = state.apply(Update::Fetched(FetchOutcome {
        history: Ok(HistoryBatch {
            samples: vec![sample(0, "h0", Tv, 1)],
            malformed: 2,
        }),
        summary: Err(FetchError::Status {
            status: 500,
            url: "x".into(),
        }),
        completed_at: Utc::now(),
    }));
    assert_eq!(kind, Some(MutationKind::SnapshotReplaced));
    assert_eq!(state.window().len(), 1);
    // Previous summary counters stay.
    assert_eq!(state.aggregate().active_stations, 5);
    assert_eq!(state.fetch_status().consecutive_failures, 1);
    assert_eq!(state.stats().history_records_dropped, 2);
}

#[test]
fn station_status_never_appends_or_changes_totals() {
    let mut state = AggregatorState::new(50);
    state.apply(audience("r1", Radio, 100));
    state.apply(audience("t1", Tv, 50));
    let window_before = state.window().to_vec();

    let kind = state.apply(Update::Event(LiveEvent::StationStatus(
        serde_json::json!({ "stationId": "r1", "type": "radio", "audience": 10_000 }),
    )));

    assert_eq!(kind, Some(MutationKind::StationStatus));
    assert_eq!(state.window().to_vec(), window_before);
    assert_eq!(state.aggregate().total_listeners, 100);
    assert_eq!(state.aggregate().total_viewers, 50);
    assert!(state.live().station_status().is_some());
}

#[test]
fn disconnect_preserves_window_and_live_state() {
    let mut state = AggregatorState::new(50);
    state.apply(Update::Connected);
    state.apply(audience("r1", Radio, 100));
    let window_before = state.window().to_vec();
    let live_before = state.live().clone();

    let kind = state.apply(Update::Disconnected {
        reason: "stream ended".into(),
    });

    assert_eq!(kind, Some(MutationKind::Disconnected));
    assert_eq!(state.connection_status(), ConnectionStatus::Disconnected);
    assert_eq!(
        state.aggregate().connection_status,
        ConnectionStatus::Disconnected
    );
    assert_eq!(state.window().to_vec(), window_before);
    assert_eq!(state.live(), &live_before);
    assert_eq!(state.aggregate().total_listeners, 100);
}

#[test]
fn rejected_event_publishes_nothing_and_is_counted() {
    let mut state = AggregatorState::new(50);
    state.apply(audience("r1", Radio, 1));
    let kind = state.apply(Update::Rejected {
        reason: "missing stationId".into(),
    });
    assert_eq!(kind, None);
    assert_eq!(state.window().len(), 1);
    assert_eq!(state.stats().events_dropped, 1);
}

#[test]
fn snapshot_carries_full_state_and_increments_revision() {
    let mut state = AggregatorState::new(50);
    state.apply(Update::Connected);
    let kind = state.apply(audience("r1", Radio, 7)).unwrap();
    let first = state.snapshot(kind);
    let second = state.snapshot(kind);

    assert_eq!(first.revision + 1, second.revision);
    assert_eq!(first.cause, MutationKind::AudienceAppended);
    assert_eq!(first.window.len(), 1);
    assert_eq!(first.stations.station("r1").map(|r| r.audience_count), Some(7));
    assert_eq!(first.aggregate.total_listeners, 7);
    assert!(first.is_connected());
    assert!(first.fetch.loading);
}

#[test]
fn undecodable_summary_keeps_previous_counters() {
    let mut state = AggregatorState::new(50);
    state.apply(fetched(
        Vec::new(),
        DashboardSummary {
            active_stations: 6,
            trending_programs: 2,
            ..Default::default()
        },
    ));
    state.apply(Update::Fetched(FetchOutcome {
        history: Ok(HistoryBatch::default()),
        summary: Err(FetchError::Decode {
            url: "http://backend/analytics/dashboard".into(),
            reason: "invalid type: string \"six\"".into(),
        }),
        completed_at: Utc::now(),
    }));

    assert_eq!(state.aggregate().active_stations, 6);
    assert_eq!(state.aggregate().trending_programs, 2);
    let fetch = state.fetch_status();
    assert_eq!(fetch.consecutive_failures, 1);
    assert!(fetch.last_error.as_deref().unwrap().contains("six"));
}
