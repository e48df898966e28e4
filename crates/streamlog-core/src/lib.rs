//! # streamlog-core
//!
//! Foundation types, errors, and retry policy shared by the streamlog crates.
//!
//! - **Identity and tokens**: [`StreamIdentity`], [`SequenceToken`], [`WriteToken`]
//! - **Records**: [`LogRecord`] (application input) and [`WireEvent`] (what the
//!   remote service stores)
//! - **Levels**: [`LogLevel`] with bunyan-compatible numeric values
//! - **Errors**: [`RemoteError`] classification, [`DeliveryError`] for the write path
//! - **Retry**: [`RetryPolicy`] fixed-interval or capped exponential delays
//! - **Logging**: [`logging::init_subscriber`] for stderr tracing output

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod record;
pub mod retry;
pub mod types;

pub use errors::{
    DeliveryError, FailureClass, ProvisioningError, RecordError, RemoteError, RemoteErrorKind,
    SinkError,
};
pub use record::{LogRecord, MAX_MESSAGE_BYTES, TIME_FIELD, WireEvent};
pub use retry::RetryPolicy;
pub use types::{LogLevel, SequenceToken, StreamIdentity, WriteToken};
