//! Monitoring sink for forwarder health.
//!
//! The drop accountant reports through a [`Monitor`]: hard batch failures as
//! errors, informational transport notices and aggregated drop summaries as
//! events, and every drop as a counter increment.

use std::error::Error;

use tracing::{error, trace, warn};

use crate::entry::Attributes;

/// Event type used for informational notices and drop summaries, shared with
/// other integrations reporting to the same account.
pub const NOTIFICATION_EVENT: &str = "NrIntegrationError";

/// External monitoring collaborator.
pub trait Monitor: Send + Sync {
    /// Report an error that caused a whole batch to be lost.
    fn notice_error(&self, error: &dyn Error, attributes: Attributes);

    /// Record a structured event.
    fn record_event(&self, event_type: &str, attributes: Attributes);

    /// Add `count` to a named counter.
    fn increment_counter(&self, name: &str, count: u64);
}

/// Monitor that writes every report to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn notice_error(&self, err: &dyn Error, attributes: Attributes) {
        error!(error = %err, attributes = ?attributes, "Log batch lost");
    }

    fn record_event(&self, event_type: &str, attributes: Attributes) {
        warn!(event_type = event_type, attributes = ?attributes, "Log forwarder notification");
    }

    fn increment_counter(&self, name: &str, count: u64) {
        trace!(counter = name, count = count, "Counter incremented");
    }
}
