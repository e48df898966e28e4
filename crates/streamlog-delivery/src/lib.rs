//! # streamlog-delivery
//!
//! Delivers structured log records, one at a time and in order, to a remote
//! append-only log stream that guards writes with server-issued sequence
//! tokens.
//!
//! - [`encoder`]: `LogRecord` → `WireEvent`
//! - [`token_cache`]: the single current write token
//! - [`provisioner`]: create-if-missing and token lookup
//! - [`engine`]: the write state machine (retry, refresh, provision)
//! - [`error_sink`]: where unrecoverable failures go
//! - [`sink`]: the producer-facing queue and its worker task
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamlog_client::MemoryLogService;
//! use streamlog_core::LogRecord;
//! use streamlog_delivery::LogSink;
//! use streamlog_settings::StreamLogSettings;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = StreamLogSettings::for_stream("app", "web-1");
//! let sink = LogSink::from_settings(Arc::new(MemoryLogService::new()), &settings);
//! sink.accept(LogRecord::now().with_field("msg", "started")).await?;
//! sink.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod encoder;
pub mod engine;
pub mod error_sink;
pub mod provisioner;
pub mod sink;
pub mod token_cache;

pub use encoder::encode;
pub use engine::{Delivered, DeliveryConfig, DeliveryEngine, EngineState};
pub use error_sink::{ErrorSink, ExitProcess, LogErrors, error_sink_for};
pub use provisioner::StreamProvisioner;
pub use sink::{LogSink, LogSinkHandle};
pub use token_cache::SequenceTokenCache;
