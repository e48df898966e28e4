//! Remote log client trait and its request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use streamlog_core::{RemoteError, SequenceToken, StreamIdentity, WireEvent};

/// One stream as reported by a describe call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescription {
    /// Stream name.
    pub name: String,
    /// Token for the next write; `None` until the stream is first written.
    pub upload_sequence_token: Option<SequenceToken>,
}

/// Result of a describe-streams call: every stream whose name starts with
/// the requested prefix, in the service's order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeStreamsResponse {
    /// Matching streams.
    pub streams: Vec<StreamDescription>,
}

impl DescribeStreamsResponse {
    /// The stream whose name equals `name` exactly.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&StreamDescription> {
        self.streams.iter().find(|s| s.name == name)
    }
}

/// A put-events request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutEventsRequest {
    /// Group name.
    pub group_name: String,
    /// Stream name.
    pub stream_name: String,
    /// Token returned by the previous write, or `None` for a new stream.
    pub sequence_token: Option<SequenceToken>,
    /// Events to append, in order.
    pub events: Vec<WireEvent>,
}

impl PutEventsRequest {
    /// A request for a single event.
    pub fn single(
        identity: &StreamIdentity,
        sequence_token: Option<SequenceToken>,
        event: WireEvent,
    ) -> Self {
        Self {
            group_name: identity.group_name.clone(),
            stream_name: identity.stream_name.clone(),
            sequence_token,
            events: vec![event],
        }
    }
}

/// A successful put-events response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutEventsResponse {
    /// Token the next write must present.
    pub next_sequence_token: Option<SequenceToken>,
}

/// Async RPC surface of a remote append-only log-stream service.
///
/// Implementations translate these calls to a concrete wire protocol. Errors
/// must carry a [`RemoteErrorKind`](streamlog_core::RemoteErrorKind) so the
/// delivery engine can tell throttling, stale tokens, and missing streams
/// apart from fatal failures.
#[async_trait]
pub trait RemoteLogClient: Send + Sync {
    /// Create a group.
    async fn create_group(&self, group_name: &str) -> Result<(), RemoteError>;

    /// Create a stream inside an existing group.
    async fn create_stream(&self, group_name: &str, stream_name: &str) -> Result<(), RemoteError>;

    /// List the streams of a group whose name starts with `stream_name_prefix`.
    async fn describe_streams(
        &self,
        group_name: &str,
        stream_name_prefix: &str,
    ) -> Result<DescribeStreamsResponse, RemoteError>;

    /// Append events to a stream.
    async fn put_events(&self, request: PutEventsRequest) -> Result<PutEventsResponse, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_matches_exact_name_only() {
        let response = DescribeStreamsResponse {
            streams: vec![
                StreamDescription {
                    name: "web-10".into(),
                    upload_sequence_token: Some("1".into()),
                },
                StreamDescription {
                    name: "web-1".into(),
                    upload_sequence_token: None,
                },
            ],
        };
        let found = response.find("web-1").unwrap();
        assert!(found.upload_sequence_token.is_none());
        assert!(response.find("web").is_none());
    }

    #[test]
    fn single_event_request() {
        let identity = StreamIdentity::new("g", "s");
        let event = WireEvent {
            message: "{}".into(),
            timestamp_millis: 1,
        };
        let request = PutEventsRequest::single(&identity, None, event.clone());
        assert_eq!(request.group_name, "g");
        assert_eq!(request.stream_name, "s");
        assert_eq!(request.events, vec![event]);
    }
}
