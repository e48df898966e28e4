//! Record encoding.
//!
//! [`encode`] turns a [`LogRecord`] into the [`WireEvent`] the remote service
//! stores. The body is the record's fields serialized as a JSON object with
//! the time field left out; the time becomes the event timestamp. Encoding
//! never fails. A body over [`MAX_MESSAGE_BYTES`] is replaced by
//! `{"msg":<prefix>,"truncated":true}`, where `<prefix>` is the start of the
//! original body cut on a character boundary, so the message is always valid
//! JSON.

use serde_json::{Map, Value, json};
use streamlog_core::{LogRecord, MAX_MESSAGE_BYTES, TIME_FIELD, WireEvent};

/// Encode a record for the wire. Pure and idempotent.
pub fn encode(record: &LogRecord) -> WireEvent {
    let body: Map<String, Value> = record
        .fields()
        .iter()
        .filter(|(key, _)| key.as_str() != TIME_FIELD)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    // A map of JSON values always serializes.
    let message = fit_message(Value::Object(body).to_string(), MAX_MESSAGE_BYTES);

    WireEvent {
        message,
        timestamp_millis: record.time_millis(),
    }
}

/// Keep `message` within `max_bytes`, wrapping a prefix of it when too long.
fn fit_message(message: String, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message;
    }
    let mut budget = max_bytes;
    loop {
        let prefix = &message[..char_boundary_at_or_below(&message, budget)];
        let wrapped = json!({"truncated": true, "msg": prefix}).to_string();
        if wrapped.len() <= max_bytes || prefix.is_empty() {
            return wrapped;
        }
        // Escaping grows the prefix; shrink by the overshoot and retry.
        budget = prefix.len() - (wrapped.len() - max_bytes).min(prefix.len());
    }
}

fn char_boundary_at_or_below(s: &str, index: usize) -> usize {
    let mut end = index.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
