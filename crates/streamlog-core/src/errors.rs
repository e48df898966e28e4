//! Error hierarchy for streamlog.
//!
//! - [`RemoteError`]: an error returned by the remote log service, tagged with
//!   a [`RemoteErrorKind`] and classified into a [`FailureClass`] that drives
//!   the delivery engine's recovery decisions
//! - [`ProvisioningError`]: failure to make the target group/stream usable
//! - [`DeliveryError`]: an unrecoverable failure reported to the error sink
//! - [`SinkError`]: failure to hand a record to the delivery pipeline
//! - [`RecordError`]: failure to build a [`LogRecord`](crate::LogRecord)

use std::fmt;

use thiserror::Error;

use crate::types::{SequenceToken, StreamIdentity};

// ─────────────────────────────────────────────────────────────────────────────
// RemoteError
// ─────────────────────────────────────────────────────────────────────────────

/// Distinguishable error kinds the remote service reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The group or stream does not exist.
    NotFound,
    /// The group or stream being created already exists.
    AlreadyExists,
    /// The presented sequence token is not the one the service expects.
    InvalidToken,
    /// The same batch was already accepted with this token.
    DataAlreadyAccepted,
    /// The service is throttling or temporarily unavailable.
    Throttled,
    /// Anything else.
    Other,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::InvalidToken => write!(f, "invalid_token"),
            Self::DataAlreadyAccepted => write!(f, "data_already_accepted"),
            Self::Throttled => write!(f, "throttled"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// How the delivery engine should react to a failed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Resubmit the same event with the same token after the retry delay.
    Retryable,
    /// Invalidate the token, look it up again, then resubmit.
    StaleToken,
    /// Provision the group/stream, look the token up, then resubmit.
    Missing,
    /// The event is already stored; treat the write as delivered.
    AlreadyAccepted,
    /// Report to the error sink and give up on this record.
    Fatal,
}

/// Error returned by a remote log client call.
#[derive(Clone, Debug, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Error kind.
    pub kind: RemoteErrorKind,
    /// Human-readable message from the service.
    pub message: String,
    /// Whether the service marked the failure as transient.
    pub retryable: bool,
    /// Token the service expected, when it reports one.
    pub expected_token: Option<SequenceToken>,
}

impl RemoteError {
    /// Create an error of the given kind. Only [`RemoteErrorKind::Throttled`]
    /// is retryable by default.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind == RemoteErrorKind::Throttled,
            expected_token: None,
        }
    }

    /// A "resource not found" error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    /// A "resource already exists" error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AlreadyExists, message)
    }

    /// An invalid sequence token error, optionally carrying the expected token.
    pub fn invalid_token(expected: Option<SequenceToken>) -> Self {
        Self {
            expected_token: expected,
            ..Self::new(
                RemoteErrorKind::InvalidToken,
                "the given sequence token is invalid",
            )
        }
    }

    /// A "data already accepted" error carrying the token for the next write.
    pub fn data_already_accepted(expected: Option<SequenceToken>) -> Self {
        Self {
            expected_token: expected,
            ..Self::new(
                RemoteErrorKind::DataAlreadyAccepted,
                "the given batch of log events has already been accepted",
            )
        }
    }

    /// A throttling error (retryable).
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Throttled, message)
    }

    /// An unclassified error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Other, message)
    }

    /// Override the retryable flag.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Classify a put-events failure.
    ///
    /// The retryable flag wins over the kind: a transient failure is
    /// resubmitted unchanged whatever else the service reported.
    #[must_use]
    pub fn classify(&self) -> FailureClass {
        if self.retryable {
            return FailureClass::Retryable;
        }
        match self.kind {
            RemoteErrorKind::Throttled => FailureClass::Retryable,
            RemoteErrorKind::InvalidToken => FailureClass::StaleToken,
            RemoteErrorKind::NotFound => FailureClass::Missing,
            RemoteErrorKind::DataAlreadyAccepted => FailureClass::AlreadyAccepted,
            RemoteErrorKind::AlreadyExists | RemoteErrorKind::Other => FailureClass::Fatal,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProvisioningError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure to make a stream usable.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Describing streams failed with something other than "not found".
    #[error("describe streams failed for {identity}: {source}")]
    Describe {
        /// Target stream.
        identity: StreamIdentity,
        /// Remote error.
        #[source]
        source: RemoteError,
    },

    /// Creating the group failed.
    #[error("create group failed for {identity}: {source}")]
    CreateGroup {
        /// Target stream.
        identity: StreamIdentity,
        /// Remote error.
        #[source]
        source: RemoteError,
    },

    /// Creating the stream failed.
    #[error("create stream failed for {identity}: {source}")]
    CreateStream {
        /// Target stream.
        identity: StreamIdentity,
        /// Remote error.
        #[source]
        source: RemoteError,
    },

    /// The stream was created but never showed up in a describe.
    #[error("stream {identity} not visible after {attempts} verification attempts")]
    NotVisible {
        /// Target stream.
        identity: StreamIdentity,
        /// Number of confirmation describes issued.
        attempts: u32,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// DeliveryError
// ─────────────────────────────────────────────────────────────────────────────

/// An unrecoverable delivery failure, forwarded to the error sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The remote service rejected a write in a way the engine cannot recover.
    #[error("write to {identity} failed: {source}")]
    Remote {
        /// Target stream.
        identity: StreamIdentity,
        /// Remote error.
        #[source]
        source: RemoteError,
    },

    /// The stream could not be provisioned or its token could not be fetched.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

impl DeliveryError {
    /// Category string for logs and metric labels.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote",
            Self::Provisioning(ProvisioningError::NotVisible { .. }) => "not_visible",
            Self::Provisioning(_) => "provisioning",
        }
    }

    /// The underlying remote error, if any.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { source, .. }
            | Self::Provisioning(
                ProvisioningError::Describe { source, .. }
                | ProvisioningError::CreateGroup { source, .. }
                | ProvisioningError::CreateStream { source, .. },
            ) => Some(source),
            Self::Provisioning(ProvisioningError::NotVisible { .. }) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SinkError / RecordError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure to hand a record to the delivery pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The queue is full (non-blocking accept only).
    #[error("delivery queue is full")]
    Full,
    /// The sink was shut down.
    #[error("delivery queue is closed")]
    Closed,
    /// The worker task exited unexpectedly.
    #[error("delivery worker panicked or exited")]
    WorkerExited,
}

/// Failure to build a log record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The value is not a JSON object.
    #[error("log record must be a JSON object")]
    NotAnObject,
    /// The object has no `time` field.
    #[error("log record has no time field")]
    MissingTime,
    /// The `time` field is neither epoch milliseconds nor RFC 3339.
    #[error("invalid log record time: {0}")]
    InvalidTime(String),
    /// The value could not be converted to JSON.
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
