//! # streamlog-client
//!
//! The RPC surface the delivery engine needs from a remote append-only
//! log-stream service, and an in-memory implementation of it.
//!
//! - [`RemoteLogClient`]: create group, create stream, describe streams, put
//!   events
//! - [`MemoryLogService`]: token-enforcing in-process service with fault
//!   injection and a call log, for tests and local runs

#![deny(unsafe_code)]

pub mod client;
pub mod memory;

pub use client::{
    DescribeStreamsResponse, PutEventsRequest, PutEventsResponse, RemoteLogClient,
    StreamDescription,
};
pub use memory::{MemoryLogService, Operation, RecordedCall};
