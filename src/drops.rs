//! Drop accounting with rate-limited reporting.
//!
//! Every entry the forwarder loses is counted here exactly once. Local drops
//! (scheduling queue full, retries exhausted, shutdown) only bump the counter;
//! a background task reports the accumulated count once per interval as a
//! single summary event. Hard batch failures are counted too, and are also
//! reported individually and immediately since each one is a whole-batch loss.

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config;
use crate::entry::{render_cause_chain, Attributes};
use crate::metadata::LinkingMetadata;
use crate::monitor::{Monitor, NOTIFICATION_EVENT};
use crate::tasks::{deadline_after, spawn_named};

const REPORTER_TASK_NAME: &str = "log-notification-scheduler";
const PLUGIN_TYPE_KEY: &str = "plugin.type";

/// Aggregates dropped-entry counts and reports them to a [`Monitor`].
pub struct DropAccountant {
    plugin_type: String,
    counter_name: String,
    dropped: AtomicU64,
    total_dropped: AtomicU64,
    monitor: Arc<dyn Monitor>,
    metadata: Arc<dyn LinkingMetadata>,
    cancel: CancellationToken,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl DropAccountant {
    pub fn new(
        plugin_type: impl Into<String>,
        monitor: Arc<dyn Monitor>,
        metadata: Arc<dyn LinkingMetadata>,
    ) -> Self {
        let plugin_type = plugin_type.into();
        Self {
            counter_name: format!("Custom/LogForwarderMonitoring/{}/droppedLogs", plugin_type),
            plugin_type,
            dropped: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
            monitor,
            metadata,
            cancel: CancellationToken::new(),
            reporter: Mutex::new(None),
        }
    }

    /// Start the periodic report. The first report fires one `interval`
    /// after this call. Calling it again while running has no effect.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let mut reporter = self.reporter.lock().unwrap_or_else(|e| e.into_inner());
        if reporter.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let accountant: Weak<Self> = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        *reporter = Some(spawn_named(REPORTER_TASK_NAME, async move {
            let mut ticker = interval_at(deadline_after(interval), interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => match accountant.upgrade() {
                        Some(accountant) => {
                            accountant.report_dropped();
                        }
                        None => break,
                    },
                }
            }
            debug!("Drop reporter stopped");
        }));
    }

    /// Count a batch lost by the transport and report it immediately.
    pub fn notice_batch_failure(&self, size: usize, error: &dyn Error) {
        self.increment(size as u64);
        warn!(
            plugin_type = %self.plugin_type,
            batch_size = size,
            error = %error,
            "Log batch failed to send"
        );

        let mut attributes = self.agent_attributes();
        attributes.insert("batch.size".to_string(), json!(size));
        self.monitor.notice_error(error, attributes);
    }

    /// Forward an informational transport notice. Does not count as a drop.
    pub fn notice_info(&self, message: &str, error: Option<&dyn Error>, size: usize) {
        debug!(
            plugin_type = %self.plugin_type,
            batch_size = size,
            message = message,
            "Transport notice"
        );

        let mut attributes = self.agent_attributes();
        attributes.insert("batch.size".to_string(), json!(size));
        attributes.insert("message".to_string(), json!(message));
        if let Some(err) = error {
            attributes.insert("exception.message".to_string(), json!(err.to_string()));
            if let Some(stack) = render_cause_chain(err, config::max_stack_size()) {
                attributes.insert("exception.stacktrace".to_string(), json!(stack));
            }
        }
        self.monitor.record_event(NOTIFICATION_EVENT, attributes);
    }

    /// Count one entry dropped locally.
    pub fn notice_drop(&self) {
        self.increment(1);
    }

    /// Count `count` entries dropped locally.
    pub fn notice_drops(&self, count: u64) {
        if count > 0 {
            self.increment(count);
        }
    }

    /// Emit one summary event for the drops accumulated since the last
    /// report and reset the counter. Returns the reported count; nothing is
    /// emitted when it is zero.
    pub fn report_dropped(&self) -> u64 {
        if self.dropped.load(Ordering::Acquire) == 0 {
            return 0;
        }
        let count = self.dropped.swap(0, Ordering::AcqRel);
        if count == 0 {
            return 0;
        }

        info!(plugin_type = %self.plugin_type, dropped = count, "Dropped logs since last report");
        let mut attributes = self.agent_attributes();
        attributes.insert("message".to_string(), json!(format!("Dropped {} logs.", count)));
        attributes.insert("dropped.count".to_string(), json!(count));
        self.monitor.record_event(NOTIFICATION_EVENT, attributes);
        count
    }

    /// Drops counted since the last report.
    pub fn pending_drops(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Drops counted since creation; never reset.
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Acquire)
    }

    /// Stop the periodic report and flush any pending count as a final
    /// summary.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.reporter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.report_dropped();
    }

    fn increment(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::AcqRel);
        self.total_dropped.fetch_add(count, Ordering::AcqRel);
        self.monitor.increment_counter(&self.counter_name, count);
    }

    fn agent_attributes(&self) -> Attributes {
        let mut attributes: Attributes = self
            .metadata
            .current_metadata()
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();
        attributes.insert(PLUGIN_TYPE_KEY.to_string(), json!(self.plugin_type));
        attributes
    }
}

impl std::fmt::Debug for DropAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropAccountant")
            .field("plugin_type", &self.plugin_type)
            .field("pending_drops", &self.pending_drops())
            .field("total_dropped", &self.total_dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StaticMetadata;
    use crate::test_support::{MonitorEvent, RecordingMonitor};
    use crate::transport::TransportError;

    fn accountant() -> (Arc<DropAccountant>, Arc<RecordingMonitor>) {
        let monitor = Arc::new(RecordingMonitor::default());
        let metadata = StaticMetadata::default().with_attribute("entity.name", "checkout");
        let accountant = Arc::new(DropAccountant::new(
            "test-plugin",
            monitor.clone(),
            Arc::new(metadata),
        ));
        (accountant, monitor)
    }

    #[test]
    fn test_k_drops_produce_one_summary_and_reset() {
        let (accountant, monitor) = accountant();
        for _ in 0..7 {
            accountant.notice_drop();
        }

        assert_eq!(accountant.report_dropped(), 7);
        assert_eq!(accountant.pending_drops(), 0);
        assert_eq!(accountant.total_dropped(), 7);

        let events = monitor.events_of_type(NOTIFICATION_EVENT);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("message"), Some(&json!("Dropped 7 logs.")));
        assert_eq!(events[0].get("dropped.count"), Some(&json!(7)));
        assert_eq!(events[0].get("entity.name"), Some(&json!("checkout")));
        assert_eq!(events[0].get("plugin.type"), Some(&json!("test-plugin")));

        // Nothing new to report
        assert_eq!(accountant.report_dropped(), 0);
        assert_eq!(monitor.events_of_type(NOTIFICATION_EVENT).len(), 1);
    }

    #[test]
    fn test_every_drop_increments_counter() {
        let (accountant, monitor) = accountant();
        accountant.notice_drop();
        accountant.notice_drops(4);
        accountant.notice_drops(0);

        assert_eq!(
            monitor.counter_total("Custom/LogForwarderMonitoring/test-plugin/droppedLogs"),
            5
        );
    }

    #[test]
    fn test_batch_failure_is_counted_and_reported_immediately() {
        let (accountant, monitor) = accountant();
        let err = TransportError::Rejected("payload refused".to_string());

        accountant.notice_batch_failure(12, &err);

        assert_eq!(accountant.pending_drops(), 12);
        let errors: Vec<MonitorEvent> = monitor
            .events()
            .into_iter()
            .filter(|e| matches!(e, MonitorEvent::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            MonitorEvent::Error { message, attributes } => {
                assert!(message.contains("payload refused"));
                assert_eq!(attributes.get("batch.size"), Some(&json!(12)));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_info_does_not_count_as_drop() {
        let (accountant, monitor) = accountant();
        let err = TransportError::Status {
            status: 429,
            body: "slow down".to_string(),
        };

        accountant.notice_info("rate limited", Some(&err), 3);

        assert_eq!(accountant.pending_drops(), 0);
        assert_eq!(accountant.total_dropped(), 0);
        let events = monitor.events_of_type(NOTIFICATION_EVENT);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("message"), Some(&json!("rate limited")));
        assert_eq!(events[0].get("batch.size"), Some(&json!(3)));
        assert!(events[0]
            .get("exception.message")
            .and_then(|v| v.as_str())
            .unwrap()
            .contains("slow down"));
        assert!(!events[0].contains_key("exception.stacktrace"));
    }

    #[test]
    fn test_info_carries_cause_chain_as_stacktrace() {
        let (accountant, monitor) = accountant();
        let cause = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = TransportError::Encode(cause);

        accountant.notice_info("payload split", Some(&err), 2);

        let events = monitor.events_of_type(NOTIFICATION_EVENT);
        assert_eq!(events.len(), 1);
        let stack = events[0]
            .get("exception.stacktrace")
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(stack.starts_with("caused by: EOF while parsing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_report_once_per_window() {
        let (accountant, monitor) = accountant();
        accountant.start(Duration::from_secs(30));

        accountant.notice_drop();
        accountant.notice_drop();
        accountant.notice_drop();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(monitor.events_of_type(NOTIFICATION_EVENT).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let events = monitor.events_of_type(NOTIFICATION_EVENT);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("dropped.count"), Some(&json!(3)));
        assert_eq!(accountant.pending_drops(), 0);

        // An idle window emits nothing
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(monitor.events_of_type(NOTIFICATION_EVENT).len(), 1);

        accountant.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timer_and_flushes_pending() {
        let (accountant, monitor) = accountant();
        accountant.start(Duration::from_secs(30));
        accountant.notice_drops(2);

        accountant.shutdown();
        assert_eq!(monitor.events_of_type(NOTIFICATION_EVENT).len(), 1);

        accountant.notice_drop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(monitor.events_of_type(NOTIFICATION_EVENT).len(), 1);
        assert_eq!(accountant.pending_drops(), 1);
    }
}
