//! Settings types and validation.

use serde::{Deserialize, Serialize};
use streamlog_core::retry::DEFAULT_MAX_DELAY_MS;
use streamlog_core::{LogLevel, RetryPolicy, StreamIdentity};

use crate::errors::{Result, SettingsError};

/// Longest group or stream name the service accepts.
pub const MAX_NAME_LEN: usize = 512;

/// What to do with an unrecoverable delivery error when no custom sink is
/// supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnErrorPolicy {
    /// Log the error, then terminate the process.
    #[default]
    Exit,
    /// Log the error and keep going.
    Log,
}

/// Capped exponential backoff, replacing the fixed `write_interval_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on a single delay.
    pub max_delay_ms: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Complete delivery configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamLogSettings {
    /// Target group (required).
    pub group_name: String,
    /// Target stream (required).
    pub stream_name: String,
    /// Delay before resubmitting a throttled or refreshed write.
    pub write_interval_ms: u64,
    /// Level at or above which a record dropped by the tracing layer is
    /// counted with `instant="true"`.
    pub instant_write_level: LogLevel,
    /// Minimum level the tracing layer forwards.
    pub forward_level: LogLevel,
    /// Built-in error sink to use.
    pub on_error: OnErrorPolicy,
    /// Records that may wait in the delivery queue.
    pub queue_capacity: usize,
    /// Confirmation describes issued after creating a stream.
    pub verify_attempts: u32,
    /// Optional backoff replacing the fixed interval.
    pub backoff: Option<BackoffSettings>,
    /// `EnvFilter` directive for local stderr output, used by
    /// `streamlog_tracing::init_subscriber_from_settings`. `RUST_LOG` wins
    /// when set.
    pub log_level: String,
}

impl Default for StreamLogSettings {
    fn default() -> Self {
        Self {
            group_name: String::new(),
            stream_name: String::new(),
            write_interval_ms: 0,
            instant_write_level: LogLevel::Warn,
            forward_level: LogLevel::Info,
            on_error: OnErrorPolicy::Exit,
            queue_capacity: 256,
            verify_attempts: 3,
            backoff: None,
            log_level: "warn".to_string(),
        }
    }
}

impl StreamLogSettings {
    /// Settings for a stream, everything else default.
    pub fn for_stream(group_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            stream_name: stream_name.into(),
            ..Self::default()
        }
    }

    /// The target stream.
    #[must_use]
    pub fn identity(&self) -> StreamIdentity {
        StreamIdentity::new(&self.group_name, &self.stream_name)
    }

    /// Retry policy: the backoff when configured, else the fixed interval.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.backoff {
            Some(BackoffSettings {
                base_delay_ms,
                max_delay_ms,
            }) => RetryPolicy::Backoff {
                base_delay_ms,
                max_delay_ms,
            },
            None => RetryPolicy::Fixed {
                interval_ms: self.write_interval_ms,
            },
        }
    }

    /// Check names and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        validate_group_name(&self.group_name)?;
        validate_stream_name(&self.stream_name)?;
        if self.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.verify_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "verify_attempts must be at least 1".into(),
            ));
        }
        if let Some(backoff) = self.backoff {
            if backoff.base_delay_ms > backoff.max_delay_ms {
                return Err(SettingsError::InvalidValue(format!(
                    "backoff base_delay_ms ({}) exceeds max_delay_ms ({})",
                    backoff.base_delay_ms, backoff.max_delay_ms
                )));
            }
        }
        Ok(())
    }
}

/// Group names: 1–512 characters of `[A-Za-z0-9._/#-]`.
pub fn validate_group_name(name: &str) -> Result<()> {
    check_length("group_name", name)?;
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '#' | '-')))
    {
        return Err(SettingsError::InvalidValue(format!(
            "group_name contains invalid character {c:?}"
        )));
    }
    Ok(())
}

/// Stream names: 1–512 characters, no `:` or `*`.
pub fn validate_stream_name(name: &str) -> Result<()> {
    check_length("stream_name", name)?;
    if let Some(c) = name.chars().find(|c| matches!(c, ':' | '*')) {
        return Err(SettingsError::InvalidValue(format!(
            "stream_name contains invalid character {c:?}"
        )));
    }
    Ok(())
}

fn check_length(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SettingsError::InvalidValue(format!("{field} is required")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(SettingsError::InvalidValue(format!(
            "{field} exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
