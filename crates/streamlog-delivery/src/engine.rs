//! The delivery engine: one record at a time, token-safe, retrying.
//!
//! # State machine
//!
//! ```text
//!  NoToken ──provision──▶ HasToken ──put──▶ Writing ──ok──▶ HasToken
//!                                             │  ▲
//!                           throttled ────────┘  │ (same token, after delay)
//!                           invalid token / not found
//!                                             ▼  │
//!                                    AwaitingTokenRefresh
//! ```
//!
//! Any other failure, or a failure while refreshing, is handed to the
//! [`ErrorSink`] and the record is dropped. The engine keeps whatever token it
//! still trusts and carries on with the next record.
//!
//! The engine takes `&mut self` for every write, so a single owner (the sink
//! worker) serializes all writes for a stream: the sequence token is passed
//! from one write to the next and two writes can never race on it.

use std::sync::Arc;

use streamlog_client::{PutEventsRequest, RemoteLogClient};
use streamlog_core::{
    DeliveryError, FailureClass, LogRecord, RetryPolicy, StreamIdentity, WireEvent, WriteToken,
};
use streamlog_settings::StreamLogSettings;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::encoder::encode;
use crate::error_sink::ErrorSink;
use crate::provisioner::StreamProvisioner;
use crate::token_cache::SequenceTokenCache;

/// Observable engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No token known; the next write provisions first.
    NoToken,
    /// A token is cached and no write is in flight.
    HasToken,
    /// A put-events call (or its retry delay) is in progress.
    Writing,
    /// The cached token was rejected; a fresh one is being looked up.
    AwaitingTokenRefresh,
}

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Target stream.
    pub identity: StreamIdentity,
    /// Delay policy for resubmissions and confirmation describes.
    pub retry: RetryPolicy,
    /// Confirmation describes issued after creating a stream.
    pub verify_attempts: u32,
    /// Records that may wait in the sink queue.
    pub queue_capacity: usize,
}

impl DeliveryConfig {
    /// Defaults for a stream: immediate retry, 3 confirmations, 256 queued.
    pub fn new(identity: StreamIdentity) -> Self {
        Self {
            identity,
            retry: RetryPolicy::default(),
            verify_attempts: 3,
            queue_capacity: 256,
        }
    }

    /// Build from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &StreamLogSettings) -> Self {
        Self {
            identity: settings.identity(),
            retry: settings.retry_policy(),
            verify_attempts: settings.verify_attempts,
            queue_capacity: settings.queue_capacity,
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the number of confirmation describes.
    #[must_use]
    pub fn with_verify_attempts(mut self, verify_attempts: u32) -> Self {
        self.verify_attempts = verify_attempts;
        self
    }

    /// Override the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

/// A record the service accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivered {
    /// Token cached for the next write.
    pub next_token: Option<WriteToken>,
    /// Put-events calls issued for this record.
    pub attempts: u32,
}

/// One put-events attempt: the event and the token it is sent with.
struct PendingWrite<'a> {
    event: &'a WireEvent,
    token: WriteToken,
}

impl PendingWrite<'_> {
    fn request(&self, identity: &StreamIdentity) -> PutEventsRequest {
        PutEventsRequest::single(
            identity,
            self.token.sequence_token().cloned(),
            self.event.clone(),
        )
    }
}

/// Writes records to one stream, handling tokens, throttling, and
/// provisioning.
pub struct DeliveryEngine {
    identity: StreamIdentity,
    client: Arc<dyn RemoteLogClient>,
    cache: SequenceTokenCache,
    provisioner: StreamProvisioner,
    retry: RetryPolicy,
    error_sink: Arc<dyn ErrorSink>,
    state: watch::Sender<EngineState>,
}

impl DeliveryEngine {
    /// Create an engine. No remote call is made until the first delivery.
    pub fn new(
        client: Arc<dyn RemoteLogClient>,
        config: &DeliveryConfig,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let provisioner = StreamProvisioner::new(
            client.clone(),
            config.identity.clone(),
            config.retry,
            config.verify_attempts,
        );
        let (state, _) = watch::channel(EngineState::NoToken);
        Self {
            identity: config.identity.clone(),
            client,
            cache: SequenceTokenCache::new(),
            provisioner,
            retry: config.retry,
            error_sink,
            state,
        }
    }

    /// Target stream.
    #[must_use]
    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Receiver that observes state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// The cached token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&WriteToken> {
        self.cache.get()
    }

    /// Deliver one record, retrying and recovering until it is accepted or
    /// fails unrecoverably.
    ///
    /// Unrecoverable failures are reported to the error sink before being
    /// returned.
    pub async fn deliver(&mut self, record: &LogRecord) -> Result<Delivered, DeliveryError> {
        let event = encode(record);
        let result = self.write(&event).await;
        if let Err(err) = &result {
            metrics::counter!("streamlog_delivery_failures_total", "category" => err.category())
                .increment(1);
            self.set_state(if self.cache.get().is_some() {
                EngineState::HasToken
            } else {
                EngineState::NoToken
            });
            self.error_sink.report(err);
        }
        result
    }

    async fn write(&mut self, event: &WireEvent) -> Result<Delivered, DeliveryError> {
        let mut attempts = 0u32;
        let mut retries = 0u32;
        loop {
            let token = match self.cache.get() {
                Some(token) => token.clone(),
                None => self.refresh().await?,
            };
            let pending = PendingWrite { event, token };

            self.set_state(EngineState::Writing);
            attempts += 1;
            let err = match self.client.put_events(pending.request(&self.identity)).await {
                Ok(response) => {
                    let next = WriteToken::from_remote(response.next_sequence_token);
                    debug!(stream = %self.identity, attempts, next_token = %next, "log event delivered");
                    return Ok(self.accepted(Some(next), attempts));
                }
                Err(err) => err,
            };

            match err.classify() {
                FailureClass::Retryable => {
                    warn!(stream = %self.identity, attempts, error = %err, "write throttled, retrying");
                    metrics::counter!("streamlog_write_retries_total", "reason" => "retryable")
                        .increment(1);
                }
                FailureClass::StaleToken | FailureClass::Missing => {
                    warn!(
                        stream = %self.identity,
                        attempts,
                        presented = %pending.token,
                        error = %err,
                        "write rejected, refreshing sequence token"
                    );
                    metrics::counter!("streamlog_write_retries_total", "reason" => err.kind.to_string())
                        .increment(1);
                    self.cache.invalidate();
                    self.set_state(EngineState::AwaitingTokenRefresh);
                    let _ = self.refresh().await?;
                }
                FailureClass::AlreadyAccepted => {
                    debug!(stream = %self.identity, attempts, "log event was already accepted");
                    let next = err.expected_token.map(WriteToken::Sequence);
                    return Ok(self.accepted(next, attempts));
                }
                FailureClass::Fatal => {
                    return Err(DeliveryError::Remote {
                        identity: self.identity.clone(),
                        source: err,
                    });
                }
            }

            self.pause(retries).await;
            retries = retries.saturating_add(1);
        }
    }

    /// Record a successful write. `None` leaves the next write to look the
    /// token up.
    fn accepted(&mut self, next: Option<WriteToken>, attempts: u32) -> Delivered {
        match &next {
            Some(token) => {
                self.cache.set(token.clone());
                self.set_state(EngineState::HasToken);
            }
            None => {
                self.cache.invalidate();
                self.set_state(EngineState::NoToken);
            }
        }
        metrics::counter!("streamlog_events_delivered_total").increment(1);
        Delivered {
            next_token: next,
            attempts,
        }
    }

    /// Provision if needed and cache the stream's current token.
    async fn refresh(&mut self) -> Result<WriteToken, DeliveryError> {
        let token = self.provisioner.ensure().await?;
        debug!(stream = %self.identity, token = %token, "sequence token fetched");
        self.cache.set(token.clone());
        self.set_state(EngineState::HasToken);
        Ok(token)
    }

    async fn pause(&self, retry: u32) {
        let delay = self.retry.delay(retry);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state.send_replace(state);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
