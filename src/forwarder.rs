//! The log forwarder: non-blocking append, batching, flush scheduling and
//! shutdown.
//!
//! Producers hand entries to a bounded scheduling queue and return
//! immediately. A single worker task owns the [`EntryBuffer`]: it buffers
//! entries, cuts batches when the buffer fills or the flush timer fires, and
//! hands each batch to the [`Transport`]. Entries the buffer cannot take are
//! resubmitted after a backoff; anything that cannot be kept is counted by the
//! [`DropAccountant`].
//!
//! There are two backpressure gates. The scheduling queue bounds work
//! awaiting the worker (queued appends plus retries waiting on their delay),
//! and `max_queued_logs` bounds entries held by sends that have not completed.
//! While the second gate is closed the worker holds its flush, the buffer
//! stays full, and new entries take the retry path.

use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::buffer::EntryBuffer;
use crate::client::HttpTransport;
use crate::config::{ConfigError, ForwarderConfig};
use crate::drops::DropAccountant;
use crate::entry::{Attributes, LogBatch, LogEntry};
use crate::metadata::{LinkingMetadata, NoMetadata};
use crate::monitor::{Monitor, TracingMonitor};
use crate::retry::{RetrySettings, RetryableEntry};
use crate::tasks::{deadline_after, saturating_add, spawn_named};
use crate::transport::{SendOutcome, Transport, TransportError};

const WORKER_TASK_NAME: &str = "log-batcher-scheduler";
const PLUGIN_TYPE_KEY: &str = "plugin.type";

/// Extra time granted to the worker past the shutdown deadline to finish its
/// own bookkeeping.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Errors that can occur while building or starting a forwarder.
#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No transport was supplied and no license key could be resolved
    #[error("No license key configured and none available from linking metadata")]
    MissingLicenseKey,

    /// `start` was called outside a Tokio runtime
    #[error("Log forwarder must be started from within a Tokio runtime")]
    NoRuntime,

    #[error("Log forwarder was already started or shut down")]
    AlreadyStarted,
}

/// Snapshot of forwarder activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Entries passed to `append`
    pub entries_appended: u64,

    /// Entries in batches the transport delivered
    pub entries_sent: u64,

    /// Entries dropped for any reason, including hard-failed batches
    pub entries_dropped: u64,

    pub batches_sent: u64,
    pub batches_failed: u64,

    /// Flushes triggered by a full buffer
    pub size_flushes: u64,

    /// Flushes triggered by the timer
    pub time_flushes: u64,

    /// Delayed resubmissions scheduled for entries the buffer refused
    pub retries_scheduled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    appended: AtomicU64,
    sent: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    size_flushes: AtomicU64,
    time_flushes: AtomicU64,
    retries_scheduled: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self, entries_dropped: u64) -> ForwarderStats {
        ForwarderStats {
            entries_appended: self.appended.load(Ordering::Relaxed),
            entries_sent: self.sent.load(Ordering::Relaxed),
            entries_dropped,
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            size_flushes: self.size_flushes.load(Ordering::Relaxed),
            time_flushes: self.time_flushes.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
        }
    }
}

/// Bounded handoff of entries to the worker.
///
/// Depth is the number of queued entries plus retries still waiting on their
/// delay; both share the `max_scheduled_logs` limit.
#[derive(Debug, Clone)]
struct SchedulingQueue {
    tx: mpsc::Sender<RetryableEntry>,
    delayed: Arc<AtomicUsize>,
    limit: usize,
}

impl SchedulingQueue {
    fn new(limit: usize) -> (Self, mpsc::Receiver<RetryableEntry>) {
        let (tx, rx) = mpsc::channel(limit);
        let queue = Self {
            tx,
            delayed: Arc::new(AtomicUsize::new(0)),
            limit,
        };
        (queue, rx)
    }

    fn depth(&self) -> usize {
        let queued = self.tx.max_capacity() - self.tx.capacity();
        queued + self.delayed.load(Ordering::Acquire)
    }

    fn has_room(&self) -> bool {
        self.depth() < self.limit
    }

    /// Enqueue an entry, handing it back if the gate is full or the worker
    /// has stopped receiving.
    fn submit(&self, entry: RetryableEntry) -> Result<(), RetryableEntry> {
        if !self.has_room() {
            return Err(entry);
        }
        self.tx.try_send(entry).map_err(|e| e.into_inner())
    }
}

/// Cloneable append-only view of a forwarder.
///
/// Usable from any thread, including ones outside the Tokio runtime.
#[derive(Debug, Clone)]
pub struct ForwarderHandle {
    queue: SchedulingQueue,
    drops: Arc<DropAccountant>,
    counters: Arc<Counters>,
    retry: RetrySettings,
}

impl ForwarderHandle {
    /// Hand an entry to the forwarder without blocking.
    ///
    /// If the scheduling queue is full, or the forwarder has shut down, the
    /// entry is dropped and counted.
    pub fn append(&self, entry: LogEntry) {
        Counters::add(&self.counters.appended, 1);
        if self
            .queue
            .submit(RetryableEntry::new(entry, self.retry))
            .is_err()
        {
            trace!("Scheduling queue full, dropping entry");
            self.drops.notice_drop();
        }
    }
}

/// Builder for [`LogForwarder`].
pub struct ForwarderBuilder {
    plugin_type: String,
    config: ForwarderConfig,
    transport: Option<Arc<dyn Transport>>,
    metadata: Option<Arc<dyn LinkingMetadata>>,
    monitor: Option<Arc<dyn Monitor>>,
}

impl ForwarderBuilder {
    /// Use `transport` instead of the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn metadata(mut self, metadata: Arc<dyn LinkingMetadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Validate the configuration and assemble the forwarder.
    ///
    /// Without an explicit transport an [`HttpTransport`] is built, using the
    /// configured license key or, failing that, the metadata provider's.
    pub fn build(self) -> Result<LogForwarder, ForwarderError> {
        self.config.validate()?;

        let metadata: Arc<dyn LinkingMetadata> = match self.metadata {
            Some(metadata) => metadata,
            None => Arc::new(NoMetadata),
        };
        let monitor: Arc<dyn Monitor> = match self.monitor {
            Some(monitor) => monitor,
            None => Arc::new(TracingMonitor),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let license_key = self
                    .config
                    .resolve_license_key(metadata.as_ref())
                    .ok_or(ForwarderError::MissingLicenseKey)?;
                Arc::new(HttpTransport::new(&self.config, license_key)?)
            }
        };

        let drops = Arc::new(DropAccountant::new(
            self.plugin_type.clone(),
            monitor,
            metadata.clone(),
        ));
        let counters = Arc::new(Counters::default());
        let (queue, receiver) = SchedulingQueue::new(self.config.max_scheduled_logs);
        let handle = ForwarderHandle {
            queue,
            drops: drops.clone(),
            counters: counters.clone(),
            retry: self.config.retry,
        };

        Ok(LogForwarder {
            plugin_type: self.plugin_type,
            config: self.config,
            transport,
            metadata,
            drops,
            counters,
            handle,
            receiver: Some(receiver),
            worker: None,
            shutdown_tx: None,
            stopped: false,
        })
    }
}

/// Asynchronous batching forwarder.
///
/// # Example
///
/// ```no_run
/// use log_forwarder::{ForwarderConfig, LogEntry, LogForwarder, LogLevel};
///
/// #[tokio::main]
/// async fn main() {
///     let config = ForwarderConfig {
///         license_key: Some("my-license-key".to_string()),
///         ..ForwarderConfig::default()
///     };
///     let mut forwarder = LogForwarder::builder("my-app", config)
///         .build()
///         .expect("Failed to build forwarder");
///     forwarder.start().expect("Failed to start forwarder");
///
///     forwarder.append(LogEntry::new(LogLevel::Info, "hello"));
///
///     forwarder.shutdown().await;
/// }
/// ```
pub struct LogForwarder {
    plugin_type: String,
    config: ForwarderConfig,
    transport: Arc<dyn Transport>,
    metadata: Arc<dyn LinkingMetadata>,
    drops: Arc<DropAccountant>,
    counters: Arc<Counters>,
    handle: ForwarderHandle,
    /// Present until the worker takes it on start
    receiver: Option<mpsc::Receiver<RetryableEntry>>,
    worker: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<Instant>>,
    stopped: bool,
}

impl LogForwarder {
    /// Start building a forwarder tagged with `plugin_type`.
    pub fn builder(plugin_type: impl Into<String>, config: ForwarderConfig) -> ForwarderBuilder {
        ForwarderBuilder {
            plugin_type: plugin_type.into(),
            config,
            transport: None,
            metadata: None,
            monitor: None,
        }
    }

    /// Start the transport, the drop report timer and the worker.
    ///
    /// Entries appended before `start` wait in the scheduling queue.
    pub fn start(&mut self) -> Result<(), ForwarderError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ForwarderError::NoRuntime);
        }
        if self.receiver.is_none() || self.stopped {
            return Err(ForwarderError::AlreadyStarted);
        }

        self.transport.start()?;
        let rx = self.receiver.take().ok_or(ForwarderError::AlreadyStarted)?;
        let worker = self.new_worker(rx);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.drops.start(self.config.drop_report_interval);
        self.worker = Some(spawn_named(WORKER_TASK_NAME, worker.run(shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            plugin_type = %self.plugin_type,
            max_logs_per_batch = self.config.max_logs_per_batch,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            "Log forwarder started"
        );
        Ok(())
    }

    fn new_worker(&self, rx: mpsc::Receiver<RetryableEntry>) -> Worker {
        Worker {
            plugin_type: self.plugin_type.clone(),
            buffer: EntryBuffer::new(self.config.max_logs_per_batch),
            max_logs_per_batch: self.config.max_logs_per_batch,
            max_queued_logs: self.config.max_queued_logs,
            flush_interval: self.config.flush_interval,
            default_termination: self.config.max_termination_time,
            transport: self.transport.clone(),
            metadata: self.metadata.clone(),
            drops: self.drops.clone(),
            counters: self.counters.clone(),
            queue: self.handle.queue.clone(),
            rx,
            in_flight: JoinSet::new(),
            in_flight_entries: 0,
            retries: JoinSet::new(),
            retry_cancel: CancellationToken::new(),
        }
    }

    /// Hand an entry to the forwarder without blocking. See
    /// [`ForwarderHandle::append`].
    pub fn append(&self, entry: LogEntry) {
        self.handle.append(entry);
    }

    /// A cloneable handle for appending from other tasks or threads.
    pub fn handle(&self) -> ForwarderHandle {
        self.handle.clone()
    }

    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn stats(&self) -> ForwarderStats {
        self.counters.snapshot(self.drops.total_dropped())
    }

    /// Shut down within the configured `max_termination_time`.
    pub async fn shutdown(&mut self) {
        self.shutdown_with_timeout(self.config.max_termination_time)
            .await;
    }

    /// Flush what is queued and buffered, wait for in-flight sends, and stop.
    ///
    /// Everything is bounded by one deadline `timeout` from now. Sends still
    /// running at the deadline are abandoned and their entries counted as
    /// dropped. If the worker fails instead, every entry it had not yet sent
    /// or dropped is counted as dropped. Calling this more than once has no
    /// further effect.
    pub async fn shutdown_with_timeout(&mut self, timeout: Duration) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let deadline = deadline_after(timeout);
        info!(plugin_type = %self.plugin_type, timeout_ms = timeout.as_millis() as u64, "Shutting down log forwarder");

        match self.worker.take() {
            Some(mut worker) => {
                if let Some(tx) = self.shutdown_tx.take() {
                    let _ = tx.send(deadline);
                }
                let joined = timeout_at(saturating_add(deadline, SHUTDOWN_GRACE), &mut worker).await;
                let stopped_cleanly = match joined {
                    Ok(Ok(())) => {
                        debug!("Forwarder worker stopped");
                        true
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Forwarder worker failed");
                        false
                    }
                    Err(_) => {
                        warn!("Forwarder worker did not stop before the shutdown deadline");
                        worker.abort();
                        let _ = worker.await;
                        false
                    }
                };
                if !stopped_cleanly {
                    self.count_lost_entries();
                }
                self.transport.shutdown();
            }
            None => {
                // Never started: whatever was queued will not be sent
                if let Some(mut rx) = self.receiver.take() {
                    rx.close();
                    let mut queued = 0;
                    while rx.try_recv().is_ok() {
                        queued += 1;
                    }
                    self.drops.notice_drops(queued);
                }
            }
        }

        self.drops.shutdown();
        let stats = self.stats();
        info!(
            plugin_type = %self.plugin_type,
            entries_sent = stats.entries_sent,
            entries_dropped = stats.entries_dropped,
            "Log forwarder stopped"
        );
    }
}

impl LogForwarder {
    /// Count as dropped every appended entry the worker neither sent nor
    /// dropped before it died.
    ///
    /// Only valid once the worker task is gone: its buffer, its in-flight
    /// sends and its pending retries went down with it, uncounted.
    fn count_lost_entries(&self) {
        let stats = self.stats();
        let lost = stats
            .entries_appended
            .saturating_sub(stats.entries_sent)
            .saturating_sub(stats.entries_dropped);
        if lost > 0 {
            warn!(entries = lost, "Counting entries held by the failed worker as dropped");
            self.drops.notice_drops(lost);
        }
    }
}

impl std::fmt::Debug for LogForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogForwarder")
            .field("plugin_type", &self.plugin_type)
            .field("config", &self.config)
            .field("started", &self.worker.is_some())
            .field("stopped", &self.stopped)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Size,
    Timer,
    Shutdown,
}

/// The single task that owns the buffer.
struct Worker {
    plugin_type: String,
    buffer: EntryBuffer,
    max_logs_per_batch: usize,
    max_queued_logs: usize,
    flush_interval: Duration,
    default_termination: Duration,
    transport: Arc<dyn Transport>,
    metadata: Arc<dyn LinkingMetadata>,
    drops: Arc<DropAccountant>,
    counters: Arc<Counters>,
    queue: SchedulingQueue,
    rx: mpsc::Receiver<RetryableEntry>,
    in_flight: JoinSet<(usize, SendOutcome)>,
    in_flight_entries: usize,
    /// Delayed resubmissions; aborted with the worker if it dies
    retries: JoinSet<()>,
    retry_cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self, mut shutdown: oneshot::Receiver<Instant>) {
        let mut ticker = interval_at(deadline_after(self.flush_interval), self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = loop {
            tokio::select! {
                biased;

                requested = &mut shutdown => {
                    // A dropped forwarder shuts down with the default deadline
                    break requested.unwrap_or_else(|_| deadline_after(self.default_termination));
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.on_send_complete(joined);
                }
                Some(_) = self.retries.join_next(), if !self.retries.is_empty() => {}
                received = self.rx.recv() => match received {
                    Some(entry) => self.on_append(entry),
                    None => break deadline_after(self.default_termination),
                },
                _ = ticker.tick() => self.on_tick(),
            }
        };

        self.finish(deadline).await;
    }

    fn on_append(&mut self, retryable: RetryableEntry) {
        let (entry, backoff) = retryable.into_parts();
        if self.buffer.is_full() {
            self.try_flush(FlushTrigger::Size);
        }
        if let Err(entry) = self.buffer.offer(entry) {
            self.schedule_retry(RetryableEntry::from_parts(entry, backoff));
        }
    }

    fn on_tick(&mut self) {
        if !self.buffer.is_empty() {
            self.try_flush(FlushTrigger::Timer);
        }
    }

    /// Resubmit `retryable` after its next backoff wait, or drop it.
    fn schedule_retry(&mut self, mut retryable: RetryableEntry) {
        let wait = match retryable.next_wait() {
            Some(wait) => wait,
            None => {
                debug!(attempts = retryable.attempts(), "Entry retries exhausted, dropping");
                self.drops.notice_drop();
                return;
            }
        };
        if !self.queue.has_room() {
            debug!("Scheduling queue full, dropping entry instead of retrying");
            self.drops.notice_drop();
            return;
        }

        Counters::add(&self.counters.retries_scheduled, 1);
        trace!(attempt = retryable.attempts(), wait_ms = wait.as_millis() as u64, "Scheduling entry retry");

        let queue = self.queue.clone();
        let drops = self.drops.clone();
        let cancel = self.retry_cancel.clone();
        queue.delayed.fetch_add(1, Ordering::AcqRel);
        self.retries.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    queue.delayed.fetch_sub(1, Ordering::AcqRel);
                    drops.notice_drop();
                }
                _ = tokio::time::sleep(wait) => {
                    queue.delayed.fetch_sub(1, Ordering::AcqRel);
                    if queue.submit(retryable).is_err() {
                        drops.notice_drop();
                    }
                }
            }
        });
    }

    /// Cut a batch from the buffer and dispatch it.
    ///
    /// Returns `false` when the flush is held because in-flight sends leave
    /// no room for the buffered entries. An empty buffer counts as flushed.
    fn try_flush(&mut self, trigger: FlushTrigger) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        if self.in_flight_entries + self.buffer.len() > self.max_queued_logs {
            trace!(
                in_flight = self.in_flight_entries,
                buffered = self.buffer.len(),
                "Holding flush until in-flight sends complete"
            );
            return false;
        }

        match trigger {
            FlushTrigger::Size => Counters::add(&self.counters.size_flushes, 1),
            FlushTrigger::Timer => Counters::add(&self.counters.time_flushes, 1),
            FlushTrigger::Shutdown => {}
        }
        let entries = self.buffer.drain(self.max_logs_per_batch);
        self.dispatch(LogBatch::new(entries, self.batch_attributes()), trigger);
        true
    }

    fn batch_attributes(&self) -> Attributes {
        let mut attributes: Attributes = self
            .metadata
            .current_metadata()
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();
        attributes.insert(PLUGIN_TYPE_KEY.to_string(), json!(self.plugin_type));
        attributes
    }

    fn dispatch(&mut self, batch: LogBatch, trigger: FlushTrigger) {
        let size = batch.len();
        debug!(
            batch_id = %batch.batch_id(),
            batch_size = size,
            trigger = ?trigger,
            "Flushing log batch"
        );

        let transport = self.transport.clone();
        let send = match std::panic::catch_unwind(AssertUnwindSafe(|| transport.send(batch))) {
            Ok(send) => send,
            Err(_) => {
                Counters::add(&self.counters.batches_failed, 1);
                self.drops.notice_batch_failure(size, &TransportError::Panicked);
                return;
            }
        };

        self.in_flight_entries += size;
        self.in_flight.spawn(async move {
            let outcome = AssertUnwindSafe(send)
                .catch_unwind()
                .await
                .unwrap_or(SendOutcome::HardFailure(TransportError::Panicked));
            (size, outcome)
        });
    }

    fn on_send_complete(&mut self, joined: Result<(usize, SendOutcome), JoinError>) {
        let (size, outcome) = match joined {
            Ok(completed) => completed,
            Err(e) => {
                // Sends are only aborted at the shutdown deadline, which
                // accounts for them itself.
                warn!(error = %e, "Send task did not complete");
                return;
            }
        };
        self.in_flight_entries = self.in_flight_entries.saturating_sub(size);

        match outcome {
            SendOutcome::Success => {
                Counters::add(&self.counters.sent, size as u64);
                Counters::add(&self.counters.batches_sent, 1);
            }
            SendOutcome::SoftFailure { reason, error } => {
                Counters::add(&self.counters.sent, size as u64);
                Counters::add(&self.counters.batches_sent, 1);
                let error = error.as_ref().map(|e| e as &dyn Error);
                self.drops.notice_info(&reason, error, size);
            }
            SendOutcome::HardFailure(err) => {
                Counters::add(&self.counters.batches_failed, 1);
                self.drops.notice_batch_failure(size, &err);
            }
        }
    }

    /// Flush, waiting for in-flight sends to make room, until `deadline`.
    async fn flush_before(&mut self, deadline: Instant) -> bool {
        loop {
            if self.try_flush(FlushTrigger::Shutdown) {
                return true;
            }
            match timeout_at(deadline, self.in_flight.join_next()).await {
                Ok(Some(joined)) => self.on_send_complete(joined),
                Ok(None) | Err(_) => return false,
            }
        }
    }

    async fn finish(mut self, deadline: Instant) {
        debug!(
            buffered = self.buffer.len(),
            in_flight = self.in_flight_entries,
            "Forwarder worker finishing"
        );

        // Pending retries are dropped; new appends are refused
        self.retry_cancel.cancel();
        self.rx.close();
        while let Ok(Some(_)) = timeout_at(deadline, self.retries.join_next()).await {}
        if !self.retries.is_empty() {
            // Cancelled retries count their own drops once they run
            self.retries.detach_all();
        }

        while let Ok(retryable) = self.rx.try_recv() {
            let (entry, _) = retryable.into_parts();
            if self.buffer.is_full() && !self.flush_before(deadline).await {
                self.drops.notice_drop();
                continue;
            }
            if self.buffer.offer(entry).is_err() {
                self.drops.notice_drop();
            }
        }

        if !self.flush_before(deadline).await {
            let left = self.buffer.drain_all().len();
            warn!(entries = left, "Shutdown deadline reached before final flush");
            self.drops.notice_drops(left as u64);
        }

        loop {
            match timeout_at(deadline, self.in_flight.join_next()).await {
                Ok(Some(joined)) => self.on_send_complete(joined),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        batches = self.in_flight.len(),
                        entries = self.in_flight_entries,
                        "Abandoning in-flight sends at shutdown deadline"
                    );
                    self.in_flight.abort_all();
                    Counters::add(&self.counters.batches_failed, self.in_flight.len() as u64);
                    self.drops
                        .notice_batch_failure(self.in_flight_entries, &TransportError::ShutdownDeadline);
                    self.in_flight_entries = 0;
                    break;
                }
            }
        }
    }
}
