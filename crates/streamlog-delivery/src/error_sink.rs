//! Destinations for unrecoverable delivery errors.
//!
//! The engine hands every error it cannot recover from to an [`ErrorSink`].
//! The default, [`ExitProcess`], logs and terminates with status 1.
//! [`LogErrors`] only logs. Any `Fn(&DeliveryError)` closure is also a sink.

use std::sync::Arc;

use streamlog_core::DeliveryError;
use streamlog_settings::OnErrorPolicy;
use tracing::error;

/// Receives errors the delivery engine gave up on.
pub trait ErrorSink: Send + Sync {
    /// Handle one unrecoverable error.
    fn report(&self, error: &DeliveryError);
}

impl<F> ErrorSink for F
where
    F: Fn(&DeliveryError) + Send + Sync,
{
    fn report(&self, error: &DeliveryError) {
        self(error);
    }
}

/// Logs the error, then exits the process.
#[derive(Clone, Copy, Debug)]
pub struct ExitProcess {
    code: i32,
}

impl ExitProcess {
    /// Exit with the given status code.
    #[must_use]
    pub const fn with_code(code: i32) -> Self {
        Self { code }
    }
}

impl Default for ExitProcess {
    fn default() -> Self {
        Self::with_code(1)
    }
}

impl ErrorSink for ExitProcess {
    fn report(&self, err: &DeliveryError) {
        error!(category = err.category(), error = %err, code = self.code, "unrecoverable log delivery failure, exiting");
        std::process::exit(self.code);
    }
}

/// Logs the error and lets the pipeline continue with the next record.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrors;

impl ErrorSink for LogErrors {
    fn report(&self, err: &DeliveryError) {
        error!(category = err.category(), error = %err, "log record not delivered");
    }
}

/// The built-in sink for a configured policy.
pub fn error_sink_for(policy: OnErrorPolicy) -> Arc<dyn ErrorSink> {
    match policy {
        OnErrorPolicy::Exit => Arc::new(ExitProcess::default()),
        OnErrorPolicy::Log => Arc::new(LogErrors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use streamlog_core::{RemoteError, StreamIdentity};

    fn sample() -> DeliveryError {
        DeliveryError::Remote {
            identity: StreamIdentity::new("g", "s"),
            source: RemoteError::other("denied"),
        }
    }

    #[test]
    fn closure_is_a_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = move |err: &DeliveryError| captured.lock().push(err.category());
        sink.report(&sample());
        assert_eq!(*seen.lock(), vec!["remote"]);
    }

    #[test]
    fn log_errors_does_not_exit() {
        LogErrors.report(&sample());
    }

    #[test]
    fn exit_code_default() {
        assert_eq!(ExitProcess::default().code, 1);
        assert_eq!(ExitProcess::with_code(3).code, 3);
    }

    #[test]
    fn policy_selection_log() {
        let sink = error_sink_for(OnErrorPolicy::Log);
        sink.report(&sample());
    }
}
