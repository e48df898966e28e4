//! # streamlog-settings
//!
//! Configuration for a streamlog delivery pipeline.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StreamLogSettings::default()`]
//! 2. **Settings file**: `~/.streamlog/settings.json` or an explicit path
//! 3. **Environment variables**: `STREAMLOG_*` overrides (highest priority),
//!    with `__` separating nested keys (`STREAMLOG_BACKOFF__MAX_DELAY_MS`)
//!
//! `group_name` and `stream_name` have no usable default; loading fails
//! validation until both are provided by one of the layers.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{ENV_PREFIX, figment, load_settings, load_settings_from_path, settings_path};
pub use types::{BackoffSettings, OnErrorPolicy, StreamLogSettings};
