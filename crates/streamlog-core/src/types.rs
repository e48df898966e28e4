//! Stream identity, write tokens, and log levels.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// StreamIdentity
// ─────────────────────────────────────────────────────────────────────────────

/// The (group, stream) pair a delivery engine writes to.
///
/// Fixed for the lifetime of an engine; every remote call is addressed with it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamIdentity {
    /// Name of the group that owns the stream.
    pub group_name: String,
    /// Name of the append-only stream inside the group.
    pub stream_name: String,
}

impl StreamIdentity {
    /// Create an identity from group and stream names.
    pub fn new(group_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            stream_name: stream_name.into(),
        }
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_name, self.stream_name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokens
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque sequence token issued by the remote service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceToken(String);

impl SequenceToken {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SequenceToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SequenceToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A token known to be valid for the next write.
///
/// A freshly created stream has no sequence token yet; its first write is sent
/// without one. That state is distinct from "unknown", which the token cache
/// represents as the absence of any `WriteToken`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteToken {
    /// The stream has never been written to.
    Initial,
    /// The token the service expects on the next write.
    Sequence(SequenceToken),
}

impl WriteToken {
    /// Build from the optional token a describe or put call returned.
    #[must_use]
    pub fn from_remote(token: Option<SequenceToken>) -> Self {
        token.map_or(Self::Initial, Self::Sequence)
    }

    /// The token to put on the wire, if any.
    #[must_use]
    pub fn sequence_token(&self) -> Option<&SequenceToken> {
        match self {
            Self::Initial => None,
            Self::Sequence(token) => Some(token),
        }
    }
}

impl fmt::Display for WriteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("<initial>"),
            Self::Sequence(token) => write!(f, "{token}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LogLevel
// ─────────────────────────────────────────────────────────────────────────────

/// Log level with bunyan-compatible numeric values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed entry/exit points.
    Trace = 10,
    /// Intermediate values, decisions.
    Debug = 20,
    /// Outcomes, summaries.
    Info = 30,
    /// Non-fatal issues.
    Warn = 40,
    /// Errors.
    Error = 50,
    /// Unrecoverable errors.
    Fatal = 60,
}

impl LogLevel {
    /// Numeric value as it appears in a record's `level` field.
    #[must_use]
    pub const fn as_num(self) -> i32 {
        self as i32
    }

    /// Convert from a tracing level.
    #[must_use]
    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
