//! Transport seam between the forwarder and the network.
//!
//! The forwarder worker calls [`Transport::send`] once per batch, in batch
//! creation order, and drives the returned future in the background. Any
//! request-level retry is the transport's own business; the forwarder only
//! accounts for the final [`SendOutcome`].

use futures::future::BoxFuture;
use thiserror::Error;

use crate::entry::LogBatch;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Server error ({status}): {body}")]
    Status { status: u16, body: String },

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Batch could not be encoded
    #[error("Failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    /// Every request-level attempt failed
    #[error("All {attempts} send attempts exhausted. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Batch refused for a transport-specific reason
    #[error("Batch rejected: {0}")]
    Rejected(String),

    /// The send future panicked
    #[error("Transport send panicked")]
    Panicked,

    /// Shutdown deadline passed before the send completed
    #[error("Shutdown deadline exceeded before the batch was sent")]
    ShutdownDeadline,

    /// Transport could not be configured or started
    #[error("Transport configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(err)
        }
    }
}

/// Final result of sending one batch.
#[derive(Debug)]
pub enum SendOutcome {
    /// Batch accepted by the endpoint
    Success,

    /// Batch delivered, but something worth reporting happened on the way
    /// (throttling, transient errors that were retried). Not a drop.
    SoftFailure {
        reason: String,
        error: Option<TransportError>,
    },

    /// Batch lost; every entry in it counts as dropped
    HardFailure(TransportError),
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success)
    }

    /// Whether the batch's entries reached the endpoint.
    pub fn is_delivered(&self) -> bool {
        !matches!(self, SendOutcome::HardFailure(_))
    }
}

/// Sends batches to a remote ingestion endpoint.
pub trait Transport: Send + Sync {
    /// Prepare the transport; called once by `LogForwarder::start`.
    fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Begin sending `batch`.
    ///
    /// The call itself happens on the forwarder worker in batch creation
    /// order; the returned future is polled on a background task, so
    /// completions may arrive in any order.
    fn send(&self, batch: LogBatch) -> BoxFuture<'static, SendOutcome>;

    /// Release resources; called once during forwarder shutdown.
    fn shutdown(&self) {}
}
