// Audience sample: one timestamped observation for a station

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audience kind; serializes to lowercase JSON ("radio" / "tv").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceType {
    Radio,
    Tv,
}

impl AudienceType {
    /// Parse the wire value (e.g. "radio", "TV"). Anything else is not an audience type.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "radio" => Some(AudienceType::Radio),
            "tv" => Some(AudienceType::Tv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudienceType::Radio => "radio",
            AudienceType::Tv => "tv",
        }
    }
}

impl std::fmt::Display for AudienceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audience observation. Fields are private so a sample cannot be edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    timestamp: DateTime<Utc>,
    station_id: String,
    audience_type: AudienceType,
    audience_count: u64,
}

impl Sample {
    pub fn new(
        timestamp: DateTime<Utc>,
        station_id: impl Into<String>,
        audience_type: AudienceType,
        audience_count: u64,
    ) -> Self {
        Self {
            timestamp,
            station_id: station_id.into(),
            audience_type,
            audience_count,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn audience_type(&self) -> AudienceType {
        self.audience_type
    }

    pub fn audience_count(&self) -> u64 {
        self.audience_count
    }
}
