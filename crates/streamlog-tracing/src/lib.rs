//! # streamlog-tracing
//!
//! Forwards the application's own `tracing` events to a remote log stream.
//!
//! [`StreamLogLayer`] turns events into bunyan-shaped records and queues them
//! on a [`LogSinkHandle`]. [`init_subscriber_with_stream`] installs it next to
//! the usual stderr output; [`init_subscriber_from_settings`] does the same
//! with the filter and levels taken from [`StreamLogSettings`].

#![deny(unsafe_code)]

pub mod layer;

pub use layer::{DropCounter, LayerConfig, StreamLogLayer};

use streamlog_delivery::LogSinkHandle;
use streamlog_settings::StreamLogSettings;

/// Initialize the global tracing subscriber with stderr output AND remote
/// stream forwarding.
///
/// Composes a `fmt` layer (stderr) with [`StreamLogLayer`] on a shared
/// [`tracing_subscriber::Registry`]. Call once at application startup;
/// subsequent calls are no-ops. `RUST_LOG` overrides `level` when set.
///
/// Returns the layer's [`DropCounter`].
pub fn init_subscriber_with_stream(
    level: &str,
    handle: LogSinkHandle,
    config: LayerConfig,
) -> DropCounter {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let layer = StreamLogLayer::new(handle, config);
    let dropped = layer.drop_counter();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(layer)
        .try_init();

    dropped
}

/// [`init_subscriber_with_stream`] driven by loaded settings.
///
/// `settings.log_level` is the stderr filter; the layer levels come from
/// [`LayerConfig::from_settings`].
pub fn init_subscriber_from_settings(
    name: impl Into<String>,
    settings: &StreamLogSettings,
    handle: LogSinkHandle,
) -> DropCounter {
    init_subscriber_with_stream(
        &settings.log_level,
        handle,
        LayerConfig::from_settings(name, settings),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
