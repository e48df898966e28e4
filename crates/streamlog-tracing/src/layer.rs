//! Remote stream transport for `tracing` events.
//!
//! [`StreamLogLayer`] implements [`tracing_subscriber::Layer`]: every event at
//! or above the configured level becomes a bunyan-shaped [`LogRecord`] and is
//! queued on a [`LogSinkHandle`].
//!
//! # Record shape
//!
//! `name`, `pid`, `level` (10–60), `msg`, `time`, `v: 0` and `target`, plus the
//! fields of every enclosing span (outermost first, inner spans win) and the
//! event's own fields. The reserved keys always win over span and event
//! fields. `time` is the emission time; a span or event field named `time` is
//! kept as `fields.time` instead.
//!
//! # Backpressure
//!
//! The layer never blocks the thread that emitted the event. When the queue is
//! full the record is dropped and counted, labelled with whether it was at or
//! above `instant_write_level`.
//!
//! Events whose target starts with `streamlog_` are never forwarded, so the
//! delivery worker's own logging cannot loop back into the stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use streamlog_core::{LogLevel, LogRecord, TIME_FIELD};
use streamlog_delivery::LogSinkHandle;
use streamlog_settings::StreamLogSettings;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Target prefix of events that are never forwarded.
const INTERNAL_TARGET_PREFIX: &str = "streamlog_";

/// Key a user-supplied `time` field is moved to.
const USER_TIME_FIELD: &str = "fields.time";

/// Configuration for the stream layer.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    /// Application name, written as the record's `name`.
    pub name: String,
    /// Minimum level to forward. Default: info.
    pub min_level: LogLevel,
    /// Level at or above which a record counts as instant. Default: warn.
    pub instant_write_level: LogLevel,
}

impl LayerConfig {
    /// Defaults for an application name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_level: LogLevel::Info,
            instant_write_level: LogLevel::Warn,
        }
    }

    /// Levels taken from loaded settings.
    pub fn from_settings(name: impl Into<String>, settings: &StreamLogSettings) -> Self {
        Self {
            name: name.into(),
            min_level: settings.forward_level,
            instant_write_level: settings.instant_write_level,
        }
    }
}

/// Records dropped because the delivery queue was full or closed.
#[derive(Clone, Debug, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    /// Drops so far.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        let _ = self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// `tracing` layer that forwards events to a remote log stream.
pub struct StreamLogLayer {
    handle: LogSinkHandle,
    config: LayerConfig,
    pid: u32,
    dropped: DropCounter,
}

impl StreamLogLayer {
    /// Create a layer that queues records on `handle`.
    pub fn new(handle: LogSinkHandle, config: LayerConfig) -> Self {
        Self {
            handle,
            config,
            pid: std::process::id(),
            dropped: DropCounter::default(),
        }
    }

    /// Shared counter of dropped records.
    #[must_use]
    pub fn drop_counter(&self) -> DropCounter {
        self.dropped.clone()
    }

    fn submit(&self, record: LogRecord, level: LogLevel) {
        if self.handle.try_accept(record).is_ok() {
            return;
        }
        let instant = if level >= self.config.instant_write_level {
            "true"
        } else {
            "false"
        };
        metrics::counter!("streamlog_layer_dropped_total", "instant" => instant).increment(1);
        self.dropped.increment();
    }
}

/// Fields recorded on a span, kept in its extensions.
#[derive(Default)]
struct SpanFields(Map<String, Value>);

/// Visitor that writes every field into a JSON map.
struct JsonVisitor<'a> {
    fields: &'a mut Map<String, Value>,
}

impl JsonVisitor<'_> {
    fn put(&mut self, field: &Field, value: Value) {
        let _ = self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.put(field, Value::Number(n));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }
}

fn is_internal(target: &str) -> bool {
    target.starts_with(INTERNAL_TARGET_PREFIX)
}

fn insert_user_field(record: &mut LogRecord, key: String, value: Value) {
    if key == TIME_FIELD {
        record.insert(USER_TIME_FIELD, value);
    } else {
        record.insert(key, value);
    }
}

impl<S> Layer<S> for StreamLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = LogLevel::from_tracing(metadata.level());
        if level < self.config.min_level || is_internal(metadata.target()) {
            return;
        }

        let mut record = LogRecord::now();

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(SpanFields(fields)) = extensions.get::<SpanFields>() {
                    for (key, value) in fields {
                        insert_user_field(&mut record, key.clone(), value.clone());
                    }
                }
            }
        }

        let mut fields = Map::new();
        event.record(&mut JsonVisitor {
            fields: &mut fields,
        });
        let msg = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        for (key, value) in fields {
            insert_user_field(&mut record, key, value);
        }

        record.insert("name", self.config.name.clone());
        record.insert("pid", self.pid);
        record.insert("level", level.as_num());
        record.insert("msg", msg);
        record.insert("target", metadata.target());
        record.insert("v", 0);

        self.submit(record, level);
    }

    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = SpanFields::default();
        attrs.record(&mut JsonVisitor {
            fields: &mut fields.0,
        });
        span.extensions_mut().insert(fields);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            values.record(&mut JsonVisitor { fields });
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
