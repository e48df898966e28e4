//! In-memory remote log service.
//!
//! [`MemoryLogService`] enforces the same write protocol as the real service:
//!
//! - Groups and streams must be created before use; missing ones yield
//!   [`RemoteErrorKind::NotFound`](streamlog_core::RemoteErrorKind::NotFound)
//! - A new stream has no sequence token; each successful write issues a new,
//!   strictly increasing token
//! - A write presenting any other token fails with `InvalidToken` carrying the
//!   expected token, unless it repeats the previously accepted batch exactly,
//!   in which case it fails with `DataAlreadyAccepted`
//!
//! Test hooks: scripted failures per [`Operation`], a creation visibility lag
//! that hides newly created resources from the next N describes, per-call
//! latency, and a timestamped call log.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use streamlog_core::{RemoteError, RemoteErrorKind, SequenceToken, StreamIdentity, WireEvent};
use tokio::time::Instant;

use crate::client::{
    DescribeStreamsResponse, PutEventsRequest, PutEventsResponse, RemoteLogClient,
    StreamDescription,
};

/// Remote operations, for fault injection and call accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_group`.
    CreateGroup,
    /// `create_stream`.
    CreateStream,
    /// `describe_streams`.
    DescribeStreams,
    /// `put_events`.
    PutEvents,
}

/// One call observed by the service.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// Which operation was called.
    pub operation: Operation,
    /// Group addressed.
    pub group_name: String,
    /// Stream (or prefix for describes) addressed.
    pub stream_name: Option<String>,
    /// Token presented (put-events only).
    pub sequence_token: Option<SequenceToken>,
    /// Messages submitted (put-events only).
    pub messages: Vec<String>,
    /// When the call arrived.
    pub at: Instant,
    /// Error kind returned, if the call failed.
    pub error: Option<RemoteErrorKind>,
}

#[derive(Default)]
struct StreamState {
    events: Vec<WireEvent>,
    writes: u64,
    token: Option<SequenceToken>,
    last_batch: Option<(Option<SequenceToken>, Vec<WireEvent>)>,
    hidden_describes: u32,
}

#[derive(Default)]
struct GroupState {
    streams: BTreeMap<String, StreamState>,
    hidden_describes: u32,
}

#[derive(Default)]
struct ServiceState {
    groups: BTreeMap<String, GroupState>,
    faults: HashMap<Operation, VecDeque<RemoteError>>,
    calls: Vec<RecordedCall>,
    in_flight: usize,
    max_in_flight: usize,
}

impl ServiceState {
    fn take_fault(&mut self, operation: Operation) -> Option<RemoteError> {
        self.faults.get_mut(&operation)?.pop_front()
    }

    fn stream_mut(&mut self, group: &str, stream: &str) -> Result<&mut StreamState, RemoteError> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| RemoteError::not_found("The specified log group does not exist."))?
            .streams
            .get_mut(stream)
            .ok_or_else(|| RemoteError::not_found("The specified log stream does not exist."))
    }
}

/// Token-enforcing in-process log service.
#[derive(Default)]
pub struct MemoryLogService {
    state: Mutex<ServiceState>,
    creation_lag: u32,
    latency: Duration,
}

impl MemoryLogService {
    /// An empty service with no groups.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide each newly created group or stream from the next `describes`
    /// describe calls that would otherwise return it.
    #[must_use]
    pub fn with_creation_lag(mut self, describes: u32) -> Self {
        self.creation_lag = describes;
        self
    }

    /// Delay every call by `latency` before it is processed.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Create the group and stream of `identity` without recording calls.
    pub fn seed_stream(&self, identity: &StreamIdentity) {
        let mut state = self.state.lock();
        let _ = state
            .groups
            .entry(identity.group_name.clone())
            .or_default()
            .streams
            .entry(identity.stream_name.clone())
            .or_default();
    }

    /// Fail the next call of `operation` with `error`.
    ///
    /// Failures queue per operation and are consumed in order.
    pub fn fail_next(&self, operation: Operation, error: RemoteError) {
        self.state
            .lock()
            .faults
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fail the next `times` calls of `operation` with clones of `error`.
    pub fn fail_times(&self, operation: Operation, error: &RemoteError, times: usize) {
        for _ in 0..times {
            self.fail_next(operation, error.clone());
        }
    }

    /// Append an event as another writer would, advancing the stream token.
    pub fn append_external(
        &self,
        identity: &StreamIdentity,
        event: WireEvent,
    ) -> Result<SequenceToken, RemoteError> {
        let mut state = self.state.lock();
        let stream = state.stream_mut(&identity.group_name, &identity.stream_name)?;
        Ok(append(stream, None, vec![event]))
    }

    /// Remove a stream and its events.
    pub fn delete_stream(&self, identity: &StreamIdentity) {
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(&identity.group_name) {
            let _ = group.streams.remove(&identity.stream_name);
        }
    }

    /// Events stored in a stream, oldest first.
    #[must_use]
    pub fn events(&self, identity: &StreamIdentity) -> Vec<WireEvent> {
        let state = self.state.lock();
        state
            .groups
            .get(&identity.group_name)
            .and_then(|g| g.streams.get(&identity.stream_name))
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }

    /// Token the next write to a stream must present.
    #[must_use]
    pub fn current_token(&self, identity: &StreamIdentity) -> Option<SequenceToken> {
        let state = self.state.lock();
        state
            .groups
            .get(&identity.group_name)
            .and_then(|g| g.streams.get(&identity.stream_name))
            .and_then(|s| s.token.clone())
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Operations received so far, in arrival order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().calls.iter().map(|c| c.operation).collect()
    }

    /// Number of calls of one operation.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Highest number of calls that were ever being processed at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    async fn enter(&self) {
        {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn finish<T>(
        &self,
        state: &mut ServiceState,
        mut call: RecordedCall,
        result: Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        state.in_flight = state.in_flight.saturating_sub(1);
        call.error = result.as_ref().err().map(|e| e.kind);
        if let Err(e) = &result {
            tracing::trace!(operation = ?call.operation, kind = %e.kind, "memory service call failed");
        }
        state.calls.push(call);
        result
    }
}

fn call(operation: Operation, group_name: &str, stream_name: Option<&str>) -> RecordedCall {
    RecordedCall {
        operation,
        group_name: group_name.to_owned(),
        stream_name: stream_name.map(str::to_owned),
        sequence_token: None,
        messages: Vec::new(),
        at: Instant::now(),
        error: None,
    }
}

fn append(
    stream: &mut StreamState,
    presented: Option<SequenceToken>,
    events: Vec<WireEvent>,
) -> SequenceToken {
    stream.events.extend(events.iter().cloned());
    stream.writes += 1;
    let token = SequenceToken::new(format!("{:056}", stream.writes));
    stream.token = Some(token.clone());
    stream.last_batch = Some((presented, events));
    token
}

#[async_trait]
impl RemoteLogClient for MemoryLogService {
    async fn create_group(&self, group_name: &str) -> Result<(), RemoteError> {
        let record = call(Operation::CreateGroup, group_name, None);
        self.enter().await;
        let mut state = self.state.lock();
        let result = if let Some(fault) = state.take_fault(Operation::CreateGroup) {
            Err(fault)
        } else if state.groups.contains_key(group_name) {
            Err(RemoteError::already_exists(
                "The specified log group already exists",
            ))
        } else {
            let _ = state.groups.insert(
                group_name.to_owned(),
                GroupState {
                    streams: BTreeMap::new(),
                    hidden_describes: self.creation_lag,
                },
            );
            Ok(())
        };
        self.finish(&mut state, record, result)
    }

    async fn create_stream(&self, group_name: &str, stream_name: &str) -> Result<(), RemoteError> {
        let record = call(Operation::CreateStream, group_name, Some(stream_name));
        self.enter().await;
        let mut state = self.state.lock();
        let lag = self.creation_lag;
        let result = match state.take_fault(Operation::CreateStream) {
            Some(fault) => Err(fault),
            None => match state.groups.get_mut(group_name) {
                None => Err(RemoteError::not_found(
                    "The specified log group does not exist.",
                )),
                Some(group) if group.streams.contains_key(stream_name) => Err(
                    RemoteError::already_exists("The specified log stream already exists"),
                ),
                Some(group) => {
                    let _ = group.streams.insert(
                        stream_name.to_owned(),
                        StreamState {
                            hidden_describes: lag,
                            ..StreamState::default()
                        },
                    );
                    Ok(())
                }
            },
        };
        self.finish(&mut state, record, result)
    }

    async fn describe_streams(
        &self,
        group_name: &str,
        stream_name_prefix: &str,
    ) -> Result<DescribeStreamsResponse, RemoteError> {
        let record = call(
            Operation::DescribeStreams,
            group_name,
            Some(stream_name_prefix),
        );
        self.enter().await;
        let mut state = self.state.lock();
        let result = match state.take_fault(Operation::DescribeStreams) {
            Some(fault) => Err(fault),
            None => match state.groups.get_mut(group_name) {
                None => Err(RemoteError::not_found(
                    "The specified log group does not exist.",
                )),
                Some(group) if group.hidden_describes > 0 => {
                    group.hidden_describes -= 1;
                    Err(RemoteError::not_found(
                        "The specified log group does not exist.",
                    ))
                }
                Some(group) => {
                    let mut streams = Vec::new();
                    for (name, stream) in group
                        .streams
                        .iter_mut()
                        .filter(|(name, _)| name.starts_with(stream_name_prefix))
                    {
                        if stream.hidden_describes > 0 {
                            stream.hidden_describes -= 1;
                            continue;
                        }
                        streams.push(StreamDescription {
                            name: name.clone(),
                            upload_sequence_token: stream.token.clone(),
                        });
                    }
                    Ok(DescribeStreamsResponse { streams })
                }
            },
        };
        self.finish(&mut state, record, result)
    }

    async fn put_events(&self, request: PutEventsRequest) -> Result<PutEventsResponse, RemoteError> {
        let mut record = call(
            Operation::PutEvents,
            &request.group_name,
            Some(&request.stream_name),
        );
        record.sequence_token.clone_from(&request.sequence_token);
        record.messages = request.events.iter().map(|e| e.message.clone()).collect();
        self.enter().await;
        let mut state = self.state.lock();
        let result = match state.take_fault(Operation::PutEvents) {
            Some(fault) => Err(fault),
            None if request.events.is_empty() => {
                Err(RemoteError::other("at least one log event is required"))
            }
            None => state
                .stream_mut(&request.group_name, &request.stream_name)
                .and_then(|stream| {
                    if request.sequence_token == stream.token {
                        let next = append(stream, request.sequence_token, request.events);
                        return Ok(PutEventsResponse {
                            next_sequence_token: Some(next),
                        });
                    }
                    let repeated = stream.last_batch.as_ref().is_some_and(|(token, events)| {
                        *token == request.sequence_token && *events == request.events
                    });
                    if repeated {
                        Err(RemoteError::data_already_accepted(stream.token.clone()))
                    } else {
                        Err(RemoteError::invalid_token(stream.token.clone()))
                    }
                }),
        };
        self.finish(&mut state, record, result)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn identity() -> StreamIdentity {
        StreamIdentity::new("app", "web-1")
    }

    fn event(message: &str) -> WireEvent {
        WireEvent {
            message: message.to_owned(),
            timestamp_millis: 1,
        }
    }

    #[tokio::test]
    async fn describe_missing_group_is_not_found() {
        let service = MemoryLogService::new();
        let err = service.describe_streams("app", "web").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[tokio::test]
    async fn create_then_describe() {
        let service = MemoryLogService::new();
        service.create_group("app").await.unwrap();
        let described = service.describe_streams("app", "web-1").await.unwrap();
        assert!(described.streams.is_empty());

        service.create_stream("app", "web-1").await.unwrap();
        let described = service.describe_streams("app", "web-1").await.unwrap();
        assert_eq!(described.streams.len(), 1);
        assert!(described.streams[0].upload_sequence_token.is_none());
    }

    #[tokio::test]
    async fn create_twice_already_exists() {
        let service = MemoryLogService::new();
        service.create_group("app").await.unwrap();
        let err = service.create_group("app").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::AlreadyExists);

        service.create_stream("app", "s").await.unwrap();
        let err = service.create_stream("app", "s").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn create_stream_without_group() {
        let service = MemoryLogService::new();
        let err = service.create_stream("app", "s").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[tokio::test]
    async fn describe_filters_by_prefix() {
        let service = MemoryLogService::new();
        service.seed_stream(&StreamIdentity::new("app", "web-1"));
        service.seed_stream(&StreamIdentity::new("app", "web-10"));
        service.seed_stream(&StreamIdentity::new("app", "worker"));
        let described = service.describe_streams("app", "web").await.unwrap();
        let names: Vec<_> = described.streams.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["web-1", "web-10"]);
    }

    #[tokio::test]
    async fn put_advances_token() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());

        let first = service
            .put_events(PutEventsRequest::single(&identity(), None, event("a")))
            .await
            .unwrap();
        let token = first.next_sequence_token.unwrap();
        assert_eq!(service.current_token(&identity()), Some(token.clone()));

        let second = service
            .put_events(PutEventsRequest::single(&identity(), Some(token.clone()), event("b")))
            .await
            .unwrap();
        assert_ne!(second.next_sequence_token, Some(token));
        assert_eq!(service.events(&identity()).len(), 2);
    }

    #[tokio::test]
    async fn tokens_are_monotonic() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());
        let mut token = None;
        let mut seen = Vec::new();
        for i in 0..3 {
            let response = service
                .put_events(PutEventsRequest::single(&identity(), token, event(&i.to_string())))
                .await
                .unwrap();
            token = response.next_sequence_token;
            seen.push(token.clone().unwrap());
        }
        let mut sorted = seen.clone();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(seen, sorted);
    }

    #[tokio::test]
    async fn stale_token_rejected_with_expected() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());
        let expected = service.append_external(&identity(), event("other")).unwrap();

        let err = service
            .put_events(PutEventsRequest::single(&identity(), None, event("mine")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidToken);
        assert_eq!(err.expected_token, Some(expected));
    }

    #[tokio::test]
    async fn repeated_batch_already_accepted() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());
        let request = PutEventsRequest::single(&identity(), None, event("a"));
        let response = service.put_events(request.clone()).await.unwrap();

        let err = service.put_events(request).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::DataAlreadyAccepted);
        assert_eq!(err.expected_token, response.next_sequence_token);
        assert_eq!(service.events(&identity()).len(), 1);
    }

    #[tokio::test]
    async fn put_to_missing_stream() {
        let service = MemoryLogService::new();
        service.create_group("app").await.unwrap();
        let err = service
            .put_events(PutEventsRequest::single(&identity(), None, event("a")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
        assert!(err.message.contains("log stream"));
    }

    #[tokio::test]
    async fn empty_put_is_rejected() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());
        let mut request = PutEventsRequest::single(&identity(), None, event("a"));
        request.events.clear();
        let err = service.put_events(request).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Other);
    }

    #[tokio::test]
    async fn injected_faults_consumed_in_order() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());
        service.fail_next(Operation::PutEvents, RemoteError::throttled("slow down"));
        service.fail_next(Operation::PutEvents, RemoteError::other("denied"));

        let request = PutEventsRequest::single(&identity(), None, event("a"));
        let first = service.put_events(request.clone()).await.unwrap_err();
        assert!(first.retryable);
        let second = service.put_events(request.clone()).await.unwrap_err();
        assert_eq!(second.kind, RemoteErrorKind::Other);
        assert!(service.put_events(request).await.is_ok());

        let errors: Vec<_> = service.calls().iter().map(|c| c.error).collect();
        assert_eq!(
            errors,
            vec![
                Some(RemoteErrorKind::Throttled),
                Some(RemoteErrorKind::Other),
                None
            ]
        );
    }

    #[tokio::test]
    async fn creation_lag_hides_new_resources() {
        let service = MemoryLogService::new().with_creation_lag(1);
        service.create_group("app").await.unwrap();
        service.create_stream("app", "web-1").await.unwrap();

        let err = service.describe_streams("app", "web-1").await.unwrap_err();
        assert_matches!(err.kind, RemoteErrorKind::NotFound);

        let described = service.describe_streams("app", "web-1").await.unwrap();
        assert!(described.streams.is_empty());

        let described = service.describe_streams("app", "web-1").await.unwrap();
        assert_eq!(described.streams.len(), 1);
    }

    #[tokio::test]
    async fn delete_stream_then_put() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());
        service.delete_stream(&identity());
        let err = service
            .put_events(PutEventsRequest::single(&identity(), None, event("a")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[tokio::test]
    async fn call_log_records_tokens_and_messages() {
        let service = MemoryLogService::new();
        service.seed_stream(&identity());
        let _ = service
            .put_events(PutEventsRequest::single(&identity(), None, event("hello")))
            .await
            .unwrap();
        let calls = service.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, Operation::PutEvents);
        assert_eq!(calls[0].messages, vec!["hello".to_owned()]);
        assert!(calls[0].sequence_token.is_none());
        assert_eq!(service.count(Operation::PutEvents), 1);
        assert_eq!(service.max_in_flight(), 1);
    }
}
