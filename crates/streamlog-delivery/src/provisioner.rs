//! Stream provisioning and token lookup.
//!
//! [`StreamProvisioner::ensure`] makes the target stream exist and returns its
//! current write token:
//!
//! 1. Describe streams with the stream name as prefix
//! 2. Group not found → create group, create stream, confirm
//! 3. No stream with exactly this name → create stream, confirm
//! 4. Stream found → its token is the answer
//!
//! The service may acknowledge a create before a describe reflects it, so a
//! created stream is never trusted until a describe returns it. Confirmation
//! describes repeat up to `verify_attempts` times without creating again.
//! `AlreadyExists` from a create means another writer won the race and is
//! treated as success.

use std::sync::Arc;

use streamlog_client::RemoteLogClient;
use streamlog_core::{
    ProvisioningError, RemoteError, RemoteErrorKind, RetryPolicy, StreamIdentity, WriteToken,
};
use tracing::{debug, info};

/// Outcome of a single describe.
enum Lookup {
    Found(WriteToken),
    GroupMissing,
    StreamMissing,
}

/// Ensures a stream exists and looks up its token.
pub struct StreamProvisioner {
    client: Arc<dyn RemoteLogClient>,
    identity: StreamIdentity,
    retry: RetryPolicy,
    verify_attempts: u32,
}

impl StreamProvisioner {
    /// Create a provisioner for one stream.
    ///
    /// `verify_attempts` is clamped to at least one confirmation describe.
    pub fn new(
        client: Arc<dyn RemoteLogClient>,
        identity: StreamIdentity,
        retry: RetryPolicy,
        verify_attempts: u32,
    ) -> Self {
        Self {
            client,
            identity,
            retry,
            verify_attempts: verify_attempts.max(1),
        }
    }

    /// Make the stream exist and return the token for its next write.
    pub async fn ensure(&self) -> Result<WriteToken, ProvisioningError> {
        match self.describe().await? {
            Lookup::Found(token) => return Ok(token),
            Lookup::GroupMissing => {
                info!(stream = %self.identity, "log group missing, creating group and stream");
                self.create_group().await?;
                self.create_stream().await?;
            }
            Lookup::StreamMissing => {
                info!(stream = %self.identity, "log stream missing, creating stream");
                self.create_stream().await?;
            }
        }
        metrics::counter!("streamlog_provisioned_total").increment(1);
        self.confirm().await
    }

    async fn describe(&self) -> Result<Lookup, ProvisioningError> {
        let described = self
            .client
            .describe_streams(&self.identity.group_name, &self.identity.stream_name)
            .await;
        match described {
            Ok(response) => Ok(response.find(&self.identity.stream_name).map_or(
                Lookup::StreamMissing,
                |stream| Lookup::Found(WriteToken::from_remote(stream.upload_sequence_token.clone())),
            )),
            Err(err) if err.kind == RemoteErrorKind::NotFound => Ok(Lookup::GroupMissing),
            Err(source) => Err(ProvisioningError::Describe {
                identity: self.identity.clone(),
                source,
            }),
        }
    }

    async fn confirm(&self) -> Result<WriteToken, ProvisioningError> {
        for attempt in 0..self.verify_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay(attempt - 1)).await;
            }
            if let Lookup::Found(token) = self.describe().await? {
                debug!(stream = %self.identity, attempt, "stream creation confirmed");
                return Ok(token);
            }
            debug!(stream = %self.identity, attempt, "created stream not visible yet");
        }
        Err(ProvisioningError::NotVisible {
            identity: self.identity.clone(),
            attempts: self.verify_attempts,
        })
    }

    async fn create_group(&self) -> Result<(), ProvisioningError> {
        let created = self.client.create_group(&self.identity.group_name).await;
        tolerate_existing(created).map_err(|source| ProvisioningError::CreateGroup {
            identity: self.identity.clone(),
            source,
        })
    }

    async fn create_stream(&self) -> Result<(), ProvisioningError> {
        let created = self
            .client
            .create_stream(&self.identity.group_name, &self.identity.stream_name)
            .await;
        tolerate_existing(created).map_err(|source| ProvisioningError::CreateStream {
            identity: self.identity.clone(),
            source,
        })
    }
}

fn tolerate_existing(result: Result<(), RemoteError>) -> Result<(), RemoteError> {
    match result {
        Err(err) if err.kind == RemoteErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use streamlog_client::{MemoryLogService, Operation};
    use streamlog_core::WireEvent;

    fn identity() -> StreamIdentity {
        StreamIdentity::new("app", "web-1")
    }

    fn provisioner(service: &Arc<MemoryLogService>) -> StreamProvisioner {
        StreamProvisioner::new(service.clone(), identity(), RetryPolicy::default(), 3)
    }

    #[tokio::test]
    async fn existing_stream_returns_token_without_creating() {
        let service = Arc::new(MemoryLogService::new());
        service.seed_stream(&identity());
        let token = service
            .append_external(
                &identity(),
                WireEvent {
                    message: "{}".into(),
                    timestamp_millis: 0,
                },
            )
            .unwrap();

        let found = provisioner(&service).ensure().await.unwrap();
        assert_eq!(found, WriteToken::Sequence(token));
        assert_eq!(service.operations(), vec![Operation::DescribeStreams]);
    }

    #[tokio::test]
    async fn new_stream_without_writes_is_initial() {
        let service = Arc::new(MemoryLogService::new());
        service.seed_stream(&identity());
        assert_eq!(provisioner(&service).ensure().await.unwrap(), WriteToken::Initial);
    }

    #[tokio::test]
    async fn missing_group_creates_group_and_stream_then_confirms() {
        let service = Arc::new(MemoryLogService::new());
        let token = provisioner(&service).ensure().await.unwrap();
        assert_eq!(token, WriteToken::Initial);
        assert_eq!(
            service.operations(),
            vec![
                Operation::DescribeStreams,
                Operation::CreateGroup,
                Operation::CreateStream,
                Operation::DescribeStreams,
            ]
        );
    }

    #[tokio::test]
    async fn missing_stream_creates_stream_only() {
        let service = Arc::new(MemoryLogService::new());
        service.create_group("app").await.unwrap();
        let _ = provisioner(&service).ensure().await.unwrap();
        assert_eq!(
            service.operations(),
            vec![
                Operation::CreateGroup,
                Operation::DescribeStreams,
                Operation::CreateStream,
                Operation::DescribeStreams,
            ]
        );
    }

    #[tokio::test]
    async fn prefix_match_is_not_mistaken_for_target() {
        let service = Arc::new(MemoryLogService::new());
        service.seed_stream(&StreamIdentity::new("app", "web-10"));
        let _ = provisioner(&service).ensure().await.unwrap();
        assert_eq!(service.count(Operation::CreateStream), 1);
        assert_eq!(service.count(Operation::CreateGroup), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_visibility_rechecks_without_recreating() {
        let service = Arc::new(MemoryLogService::new().with_creation_lag(2));
        let provisioner = StreamProvisioner::new(
            service.clone(),
            identity(),
            RetryPolicy::Fixed { interval_ms: 100 },
            5,
        );
        let token = provisioner.ensure().await.unwrap();
        assert_eq!(token, WriteToken::Initial);
        assert_eq!(service.count(Operation::CreateGroup), 1);
        assert_eq!(service.count(Operation::CreateStream), 1);
        assert!(service.count(Operation::DescribeStreams) > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn never_visible_fails() {
        let service = Arc::new(MemoryLogService::new().with_creation_lag(10));
        let err = provisioner(&service).ensure().await.unwrap_err();
        assert_matches!(err, ProvisioningError::NotVisible { attempts: 3, .. });
        assert_eq!(service.count(Operation::CreateGroup), 1);
        assert_eq!(service.count(Operation::DescribeStreams), 4);
    }

    #[tokio::test]
    async fn concurrent_creator_is_tolerated() {
        let service = Arc::new(MemoryLogService::new());
        service.fail_next(
            Operation::DescribeStreams,
            RemoteError::not_found("The specified log group does not exist."),
        );
        service.seed_stream(&identity());
        let token = provisioner(&service).ensure().await.unwrap();
        assert_eq!(token, WriteToken::Initial);
        assert_eq!(service.count(Operation::CreateGroup), 1);
        assert_eq!(service.count(Operation::CreateStream), 1);
    }

    #[tokio::test]
    async fn describe_failure_surfaces() {
        let service = Arc::new(MemoryLogService::new());
        service.fail_next(Operation::DescribeStreams, RemoteError::other("access denied"));
        let err = provisioner(&service).ensure().await.unwrap_err();
        assert_matches!(err, ProvisioningError::Describe { .. });
    }

    #[tokio::test]
    async fn create_group_failure_stops_before_stream() {
        let service = Arc::new(MemoryLogService::new());
        service.fail_next(Operation::CreateGroup, RemoteError::other("limit exceeded"));
        let err = provisioner(&service).ensure().await.unwrap_err();
        assert_matches!(err, ProvisioningError::CreateGroup { .. });
        assert_eq!(service.count(Operation::CreateStream), 0);
    }

    #[tokio::test]
    async fn create_stream_failure_surfaces() {
        let service = Arc::new(MemoryLogService::new());
        service.create_group("app").await.unwrap();
        service.fail_next(Operation::CreateStream, RemoteError::other("limit exceeded"));
        let err = provisioner(&service).ensure().await.unwrap_err();
        assert_matches!(err, ProvisioningError::CreateStream { .. });
    }
}
