// Loose wire shape shared by history records and live audience events.
// Every field is optional here; validation happens in `to_reading` / `to_sample`.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::{AudienceType, Sample, StationReading};

/// Audience payload as the backend sends it: `type`/`audience` on the live channel,
/// `audienceType`/`audienceCount` in some history responses. When a record carries both
/// spellings the short one wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAudienceRecord {
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub station_id: Option<serde_json::Value>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub audience_type: Option<String>,
    #[serde(default)]
    pub audience: Option<serde_json::Value>,
    #[serde(default)]
    pub audience_count: Option<serde_json::Value>,
}

impl RawAudienceRecord {
    pub fn to_reading(&self) -> Result<StationReading, String> {
        let station_id = match &self.station_id {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(_) => return Err("stationId is empty or not a string".into()),
            None => return Err("missing stationId".into()),
        };
        let audience_type = match self.r#type.as_deref().or(self.audience_type.as_deref()) {
            Some(t) => AudienceType::from_wire(t)
                .ok_or_else(|| format!("unknown audience type {t:?}"))?,
            None => return Err("missing audience type".into()),
        };
        let audience_count = match self.audience.as_ref().or(self.audience_count.as_ref()) {
            Some(v) => count_from_json(v)?,
            None => return Err("missing audience count".into()),
        };
        Ok(StationReading {
            station_id,
            audience_type,
            audience_count,
        })
    }

    /// History records must carry their own timestamp.
    pub fn to_sample(&self) -> Result<Sample, String> {
        let reading = self.to_reading()?;
        let timestamp = match &self.timestamp {
            Some(v) => timestamp_from_json(v)?,
            None => return Err("missing timestamp".into()),
        };
        Ok(reading.to_sample(timestamp))
    }
}

/// Non-negative integer; integral floats (e.g. `1000.0`) are accepted.
fn count_from_json(v: &serde_json::Value) -> Result<u64, String> {
    if let Some(n) = v.as_u64() {
        return Ok(n);
    }
    match v.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        Some(f) => Err(format!("audience count {f} is not a non-negative integer")),
        None => Err(format!("audience count {v} is not a number")),
    }
}

/// RFC 3339 string or epoch milliseconds.
fn timestamp_from_json(v: &serde_json::Value) -> Result<DateTime<Utc>, String> {
    match v {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("bad timestamp {s:?}: {e}")),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| format!("bad epoch-millis timestamp {n}")),
        other => Err(format!("bad timestamp {other}")),
    }
}
