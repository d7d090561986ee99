// Latest-value state fed by the live channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AudienceType, Sample};

/// Most recent audience payload pushed for one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationReading {
    pub station_id: String,
    pub audience_type: AudienceType,
    pub audience_count: u64,
}

impl StationReading {
    /// Sample stamped with the arrival instant.
    pub fn to_sample(&self, received_at: DateTime<Utc>) -> Sample {
        Sample::new(
            received_at,
            self.station_id.clone(),
            self.audience_type,
            self.audience_count,
        )
    }
}

/// Latest payload per station plus the station-status slot. Not a log: one entry per station,
/// last write wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStationState {
    stations: BTreeMap<String, StationReading>,
    /// Opaque metadata from `stationStatusUpdate`; never an audience sample.
    station_status: Option<serde_json::Value>,
}

impl LiveStationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reading it replaced, if any.
    pub fn upsert(&mut self, reading: StationReading) -> Option<StationReading> {
        self.stations.insert(reading.station_id.clone(), reading)
    }

    pub fn set_station_status(&mut self, status: serde_json::Value) {
        self.station_status = Some(status);
    }

    pub fn station(&self, station_id: &str) -> Option<&StationReading> {
        self.stations.get(station_id)
    }

    pub fn stations(&self) -> impl Iterator<Item = &StationReading> {
        self.stations.values()
    }

    pub fn station_status(&self) -> Option<&serde_json::Value> {
        self.station_status.as_ref()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty() && self.station_status.is_none()
    }
}
