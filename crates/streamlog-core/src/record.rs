//! Application log records and the wire events derived from them.
//!
//! A [`LogRecord`] is a JSON object of fields plus a distinguished time,
//! which is held separately as epoch milliseconds. The time never appears in
//! the serialized body of a [`WireEvent`]; it only drives the event timestamp.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RecordError;

/// Name of the field that carries the record time.
pub const TIME_FIELD: &str = "time";

/// Largest message body the remote service accepts for one event, in bytes.
///
/// The service limit is 256 KiB per event including a fixed 26-byte overhead.
pub const MAX_MESSAGE_BYTES: usize = 256 * 1024 - 26;

// ─────────────────────────────────────────────────────────────────────────────
// LogRecord
// ─────────────────────────────────────────────────────────────────────────────

/// A structured log record handed to the delivery pipeline.
///
/// Immutable once accepted by a sink. Build it with [`LogRecord::new`] and
/// [`LogRecord::with_field`], or parse one from JSON with
/// [`LogRecord::from_json`].
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    fields: Map<String, Value>,
    time_millis: i64,
}

impl LogRecord {
    /// Create an empty record stamped with the given epoch milliseconds.
    #[must_use]
    pub fn new(time_millis: i64) -> Self {
        Self {
            fields: Map::new(),
            time_millis,
        }
    }

    /// Create an empty record stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::new(chrono::Utc::now().timestamp_millis())
    }

    /// Add a field, returning the record.
    ///
    /// Setting [`TIME_FIELD`] updates the record time when the value parses as
    /// a timestamp, and is ignored otherwise.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a field in place. See [`LogRecord::with_field`].
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if key == TIME_FIELD {
            if let Some(millis) = parse_time(&value) {
                self.time_millis = millis;
            }
            return;
        }
        let _ = self.fields.insert(key, value);
    }

    /// Parse a record from a JSON object carrying a `time` field.
    ///
    /// The time may be epoch milliseconds or an RFC 3339 string (the format
    /// bunyan emits).
    pub fn from_json(value: Value) -> Result<Self, RecordError> {
        let Value::Object(mut fields) = value else {
            return Err(RecordError::NotAnObject);
        };
        let time = fields.remove(TIME_FIELD).ok_or(RecordError::MissingTime)?;
        let time_millis =
            parse_time(&time).ok_or_else(|| RecordError::InvalidTime(time.to_string()))?;
        Ok(Self {
            fields,
            time_millis,
        })
    }

    /// Parse a record from any serializable value. See [`LogRecord::from_json`].
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, RecordError> {
        Self::from_json(serde_json::to_value(value)?)
    }

    /// Fields other than the time.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up a single field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Record time in epoch milliseconds.
    #[must_use]
    pub fn time_millis(&self) -> i64 {
        self.time_millis
    }
}

/// Interpret a JSON value as epoch milliseconds.
#[allow(clippy::cast_possible_truncation)]
fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WireEvent
// ─────────────────────────────────────────────────────────────────────────────

/// One event as submitted to the remote service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    /// Serialized record body (JSON, without the time field).
    pub message: String,
    /// Event time in epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn from_json_numeric_time() {
        let record = LogRecord::from_json(json!({"msg": "hello", "time": 1_700_000_000_000_i64}))
            .unwrap();
        assert_eq!(record.time_millis(), 1_700_000_000_000);
        assert_eq!(record.get("msg"), Some(&json!("hello")));
        assert!(record.get(TIME_FIELD).is_none());
    }

    #[test]
    fn from_json_rfc3339_time() {
        let record =
            LogRecord::from_json(json!({"msg": "x", "time": "2023-11-14T22:13:20.000Z"})).unwrap();
        assert_eq!(record.time_millis(), 1_700_000_000_000);
    }

    #[test]
    fn from_json_fractional_millis_rounds() {
        let record = LogRecord::from_json(json!({"time": 1000.6})).unwrap();
        assert_eq!(record.time_millis(), 1001);
    }

    #[test]
    fn from_json_missing_time() {
        let err = LogRecord::from_json(json!({"msg": "x"})).unwrap_err();
        assert_matches!(err, RecordError::MissingTime);
    }

    #[test]
    fn from_json_invalid_time() {
        let err = LogRecord::from_json(json!({"time": "yesterday"})).unwrap_err();
        assert_matches!(err, RecordError::InvalidTime(_));
    }

    #[test]
    fn from_json_not_object() {
        let err = LogRecord::from_json(json!([1, 2])).unwrap_err();
        assert_matches!(err, RecordError::NotAnObject);
    }

    #[test]
    fn from_serialize_struct() {
        #[derive(Serialize)]
        struct Line<'a> {
            msg: &'a str,
            time: i64,
            level: i32,
        }
        let record = LogRecord::from_serialize(&Line {
            msg: "up",
            time: 5,
            level: 30,
        })
        .unwrap();
        assert_eq!(record.time_millis(), 5);
        assert_eq!(record.get("level"), Some(&json!(30)));
    }

    #[test]
    fn with_field_time_sets_time() {
        let record = LogRecord::new(1).with_field("time", 99).with_field("a", true);
        assert_eq!(record.time_millis(), 99);
        assert!(record.get("time").is_none());
        assert_eq!(record.fields().len(), 1);
    }

    #[test]
    fn with_field_unparseable_time_is_ignored() {
        let record = LogRecord::new(7).with_field("time", json!({"nested": 1}));
        assert_eq!(record.time_millis(), 7);
        assert!(record.fields().is_empty());
    }

    #[test]
    fn wire_event_serializes_timestamp() {
        let event = WireEvent {
            message: "{}".into(),
            timestamp_millis: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({"message": "{}", "timestamp": 12}));
    }

    proptest! {
        #[test]
        fn rfc3339_and_millis_agree(millis in 0_i64..4_102_444_800_000) {
            let dt = chrono::DateTime::from_timestamp_millis(millis).unwrap();
            let text = dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            let from_text = LogRecord::from_json(json!({"time": text})).unwrap();
            let from_number = LogRecord::from_json(json!({"time": millis})).unwrap();
            prop_assert_eq!(from_text.time_millis(), millis);
            prop_assert_eq!(from_number.time_millis(), millis);
        }
    }
}
