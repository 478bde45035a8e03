//! Log Forwarder Library
//!
//! An asynchronous, batching log forwarder. Logging adapters hand it
//! [`LogEntry`] values; it buffers them, cuts batches by size or on a timer,
//! and ships them to a log ingestion endpoint without ever blocking the
//! caller or growing without bound.
//!
//! - **forwarder**: non-blocking append, the batching worker and shutdown
//! - **buffer**: bounded FIFO owned by the worker
//! - **retry**: per-entry backoff for entries the buffer refused
//! - **drops**: drop accounting with periodic summarized reports
//! - **transport**: the seam between the forwarder and the network
//! - **client**: HTTP transport with connection pooling and retry logic
//! - **config**: tunables, loadable from the environment
//! - **entry**: entries, levels, error details and batches
//! - **metadata**: linking metadata attached to batches and reports
//! - **monitor**: monitoring sink for forwarder health
//!
//! # Example
//!
//! ```no_run
//! use log_forwarder::{ForwarderConfig, LogEntry, LogForwarder, LogLevel, StaticMetadata};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ForwarderConfig::from_env().expect("Failed to load config");
//!
//!     let mut forwarder = LogForwarder::builder("my-app", config)
//!         .metadata(Arc::new(StaticMetadata::from_env()))
//!         .build()
//!         .expect("Failed to build forwarder");
//!     forwarder.start().expect("Failed to start forwarder");
//!
//!     forwarder.append(
//!         LogEntry::new(LogLevel::Warn, "disk almost full").with_attribute("disk.free_mb", 512),
//!     );
//!
//!     forwarder.shutdown().await;
//! }
//! ```

// Module declarations
pub mod buffer;
pub mod client;
pub mod config;
pub mod drops;
pub mod entry;
pub mod forwarder;
pub mod metadata;
pub mod monitor;
pub mod retry;
pub mod tasks;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at crate root for convenience
pub use client::HttpTransport;
pub use config::{ConfigError, ForwarderConfig};
pub use drops::DropAccountant;
pub use entry::{Attributes, ErrorInfo, LogBatch, LogEntry, LogLevel};
pub use forwarder::{ForwarderBuilder, ForwarderError, ForwarderHandle, ForwarderStats, LogForwarder};
pub use metadata::{LinkingMetadata, NoMetadata, StaticMetadata};
pub use monitor::{Monitor, TracingMonitor};
pub use retry::RetrySettings;
pub use transport::{SendOutcome, Transport, TransportError};
