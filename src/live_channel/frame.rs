// Live channel frames: JSON text, either {"event": name, "data": payload} or [name, payload].

use serde_json::Value;

use crate::models::{RawAudienceRecord, StationReading};

pub const AUDIENCE_UPDATE: &str = "audienceUpdate";
pub const STATION_STATUS_UPDATE: &str = "stationStatusUpdate";

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Audience(StationReading),
    /// Opaque station-status metadata; never becomes a sample.
    StationStatus(Value),
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is neither an event object nor an event array")]
    UnknownFrame,
    #[error("malformed {event} payload: {reason}")]
    Malformed { event: &'static str, reason: String },
}

/// Handshake frame sent right after connecting.
pub fn join_frame(event: &str) -> String {
    serde_json::json!({ "event": event }).to_string()
}

/// `Ok(None)` for well-formed frames carrying an event this channel does not consume.
pub fn parse_frame(text: &str) -> Result<Option<LiveEvent>, EventError> {
    let value: Value = serde_json::from_str(text)?;
    let (name, data) = split_envelope(value)?;
    match name.as_str() {
        AUDIENCE_UPDATE => {
            let raw: RawAudienceRecord = match data {
                Some(data @ Value::Object(_)) => {
                    serde_json::from_value(data).map_err(|e| EventError::Malformed {
                        event: AUDIENCE_UPDATE,
                        reason: e.to_string(),
                    })?
                }
                _ => {
                    return Err(EventError::Malformed {
                        event: AUDIENCE_UPDATE,
                        reason: "payload is not an object".into(),
                    });
                }
            };
            raw.to_reading()
                .map(|reading| Some(LiveEvent::Audience(reading)))
                .map_err(|reason| EventError::Malformed {
                    event: AUDIENCE_UPDATE,
                    reason,
                })
        }
        STATION_STATUS_UPDATE => match data {
            Some(Value::Null) | None => Err(EventError::Malformed {
                event: STATION_STATUS_UPDATE,
                reason: "missing payload".into(),
            }),
            Some(payload) => Ok(Some(LiveEvent::StationStatus(payload))),
        },
        _ => Ok(None),
    }
}

fn split_envelope(value: Value) -> Result<(String, Option<Value>), EventError> {
    match value {
        Value::Object(mut map) => {
            let name = match map.remove("event") {
                Some(Value::String(name)) => name,
                _ => return Err(EventError::UnknownFrame),
            };
            Ok((name, map.remove("data")))
        }
        Value::Array(items) => {
            let mut items = items.into_iter();
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(EventError::UnknownFrame),
            };
            Ok((name, items.next()))
        }
        _ => Err(EventError::UnknownFrame),
    }
}
