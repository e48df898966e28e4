//! Producer-facing sink: linearized delivery via MPSC serialization.
//!
//! Every record for a stream goes through one bounded channel to a single
//! worker task that owns the [`DeliveryEngine`]. The worker finishes one record
//! (delivered or handed to the error sink) before taking the next, so records
//! reach the remote service in acceptance order and only one write is ever in
//! flight.

use std::sync::Arc;

use streamlog_client::RemoteLogClient;
use streamlog_core::{LogRecord, SinkError};
use streamlog_settings::StreamLogSettings;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{DeliveryConfig, DeliveryEngine, EngineState};
use crate::error_sink::{ErrorSink, error_sink_for};

/// Request sent to the delivery worker.
enum Command {
    Deliver(LogRecord),
    /// Sentinel: answered once every earlier command has been processed.
    Flush(oneshot::Sender<()>),
    /// Close the queue; records already queued are still delivered.
    Shutdown,
}

/// Cloneable producer handle.
///
/// Acceptance means the record is queued, not that it was delivered.
#[derive(Clone)]
pub struct LogSinkHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<EngineState>,
}

impl LogSinkHandle {
    /// Queue a record, waiting for room if the queue is full.
    pub async fn accept(&self, record: LogRecord) -> Result<(), SinkError> {
        self.tx
            .send(Command::Deliver(record))
            .await
            .map_err(|_| SinkError::Closed)
    }

    /// Queue a record without waiting.
    pub fn try_accept(&self, record: LogRecord) -> Result<(), SinkError> {
        self.tx
            .try_send(Command::Deliver(record))
            .map_err(|e| match e {
                TrySendError::Full(_) => SinkError::Full,
                TrySendError::Closed(_) => SinkError::Closed,
            })
    }

    /// Wait until every record accepted before this call has been resolved.
    pub async fn flush(&self) -> Result<(), SinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply_tx))
            .await
            .map_err(|_| SinkError::Closed)?;
        reply_rx.await.map_err(|_| SinkError::WorkerExited)
    }

    /// Current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }
}

/// Owner of the delivery worker.
pub struct LogSink {
    handle: LogSinkHandle,
    worker: JoinHandle<()>,
}

impl LogSink {
    /// Spawn the delivery worker on the current tokio runtime.
    pub fn spawn(
        client: Arc<dyn RemoteLogClient>,
        config: &DeliveryConfig,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let engine = DeliveryEngine::new(client, config, error_sink);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let state = engine.subscribe();
        let worker = tokio::spawn(delivery_worker(rx, engine));
        Self {
            handle: LogSinkHandle { tx, state },
            worker,
        }
    }

    /// Spawn a worker configured from settings, using the built-in error sink
    /// selected by `on_error`.
    pub fn from_settings(client: Arc<dyn RemoteLogClient>, settings: &StreamLogSettings) -> Self {
        Self::spawn(
            client,
            &DeliveryConfig::from_settings(settings),
            error_sink_for(settings.on_error),
        )
    }

    /// A cloneable producer handle.
    #[must_use]
    pub fn handle(&self) -> LogSinkHandle {
        self.handle.clone()
    }

    /// Queue a record, waiting for room if the queue is full.
    pub async fn accept(&self, record: LogRecord) -> Result<(), SinkError> {
        self.handle
            .accept(record)
            .await
            .map_err(|e| self.explain(e))
    }

    /// Queue a record without waiting.
    pub fn try_accept(&self, record: LogRecord) -> Result<(), SinkError> {
        self.handle.try_accept(record).map_err(|e| self.explain(e))
    }

    /// Wait until every record accepted before this call has been resolved.
    pub async fn flush(&self) -> Result<(), SinkError> {
        self.handle.flush().await.map_err(|e| self.explain(e))
    }

    /// Current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.handle.state()
    }

    /// Close the queue, deliver what was already accepted, and join the
    /// worker.
    pub async fn shutdown(self) -> Result<(), SinkError> {
        if self.handle.tx.send(Command::Shutdown).await.is_err() {
            debug!("delivery worker already stopped");
        }
        self.worker.await.map_err(|e| {
            warn!(error = %e, "delivery worker failed");
            SinkError::WorkerExited
        })
    }

    fn explain(&self, err: SinkError) -> SinkError {
        if err == SinkError::Closed && self.worker.is_finished() {
            SinkError::WorkerExited
        } else {
            err
        }
    }
}

/// Background worker that delivers records sequentially.
async fn delivery_worker(mut rx: mpsc::Receiver<Command>, mut engine: DeliveryEngine) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Deliver(record) => {
                // Failures were already reported to the error sink.
                let _ = engine.deliver(&record).await;
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => rx.close(),
        }
    }
    debug!(stream = %engine.identity(), "delivery worker stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
