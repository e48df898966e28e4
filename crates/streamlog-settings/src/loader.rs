//! Settings loading with file and environment variable layers.
//!
//! Loading flow:
//! 1. Start with compiled [`StreamLogSettings::default()`]
//! 2. If the settings file exists, merge its values over the defaults
//! 3. Merge `STREAMLOG_*` environment variables (highest priority)
//! 4. Validate the result
//!
//! A missing settings file is not an error; a malformed one is.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::Result;
use crate::types::StreamLogSettings;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "STREAMLOG_";

/// Resolve the path to the settings file (`~/.streamlog/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".streamlog").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<StreamLogSettings> {
    load_settings_from_path(&settings_path())
}

/// Load and validate settings from a specific path with env var overrides.
pub fn load_settings_from_path(path: &Path) -> Result<StreamLogSettings> {
    if path.exists() {
        debug!(?path, "loading settings from file");
    } else {
        debug!(?path, "settings file not found, using defaults");
    }
    let settings: StreamLogSettings = figment(path).extract()?;
    settings.validate()?;
    Ok(settings)
}

/// The layered provider chain, for callers that want to add layers of their
/// own before extracting.
pub fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(StreamLogSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use streamlog_core::LogLevel;

    use crate::errors::SettingsError;
    use crate::types::{BackoffSettings, OnErrorPolicy};

    #[test]
    fn settings_path_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".streamlog/settings.json"));
    }

    #[test]
    fn file_values_override_defaults() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file(
                "settings.json",
                r#"{
                    "group_name": "app",
                    "stream_name": "web-1",
                    "write_interval_ms": 500,
                    "on_error": "log"
                }"#,
            )?;
            let settings =
                load_settings_from_path(Path::new("settings.json")).map_err(|e| e.to_string())?;
            assert_eq!(settings.group_name, "app");
            assert_eq!(settings.write_interval_ms, 500);
            assert_eq!(settings.on_error, OnErrorPolicy::Log);
            assert_eq!(settings.queue_capacity, 256);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file(
                "settings.json",
                r#"{"group_name": "app", "stream_name": "web-1", "verify_attempts": 2}"#,
            )?;
            jail.set_env("STREAMLOG_STREAM_NAME", "web-2");
            jail.set_env("STREAMLOG_INSTANT_WRITE_LEVEL", "error");
            jail.set_env("STREAMLOG_BACKOFF__MAX_DELAY_MS", "2000");
            let settings =
                load_settings_from_path(Path::new("settings.json")).map_err(|e| e.to_string())?;
            assert_eq!(settings.stream_name, "web-2");
            assert_eq!(settings.verify_attempts, 2);
            assert_eq!(settings.instant_write_level, LogLevel::Error);
            assert_eq!(
                settings.backoff,
                Some(BackoffSettings {
                    base_delay_ms: 100,
                    max_delay_ms: 2000,
                })
            );
            Ok(())
        });
    }

    #[test]
    fn log_level_from_file_and_env() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file(
                "settings.json",
                r#"{"group_name": "app", "stream_name": "web-1", "log_level": "info"}"#,
            )?;
            let settings =
                load_settings_from_path(Path::new("settings.json")).map_err(|e| e.to_string())?;
            assert_eq!(settings.log_level, "info");

            jail.set_env("STREAMLOG_LOG_LEVEL", "debug");
            let settings =
                load_settings_from_path(Path::new("settings.json")).map_err(|e| e.to_string())?;
            assert_eq!(settings.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn env_only_without_file() {
        Jail::expect_with(|jail| {
            jail.set_env("STREAMLOG_GROUP_NAME", "app");
            jail.set_env("STREAMLOG_STREAM_NAME", "web-1");
            let settings =
                load_settings_from_path(Path::new("missing.json")).map_err(|e| e.to_string())?;
            assert_eq!(settings.identity().to_string(), "app/web-1");
            Ok(())
        });
    }

    #[test]
    fn missing_names_fail_validation() {
        Jail::expect_with(|_jail| {
            let err = load_settings_from_path(Path::new("missing.json")).unwrap_err();
            assert!(matches!(err, SettingsError::InvalidValue(_)));
            Ok(())
        });
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Figment(_)));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"group_name": "g", "stream_name": "s", "queue_capacity": "lots"}"#,
        )
        .unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }
}
