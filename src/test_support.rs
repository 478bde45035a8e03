//! Recording collaborators shared by the unit tests.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::entry::{Attributes, LogBatch};
use crate::monitor::Monitor;
use crate::transport::{SendOutcome, Transport, TransportError};

#[derive(Debug, Clone)]
pub(crate) enum MonitorEvent {
    Error {
        message: String,
        attributes: Attributes,
    },
    Event {
        event_type: String,
        attributes: Attributes,
    },
    Counter {
        name: String,
        count: u64,
    },
}

#[derive(Debug, Default)]
pub(crate) struct RecordingMonitor {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingMonitor {
    pub(crate) fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn events_of_type(&self, wanted: &str) -> Vec<Attributes> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MonitorEvent::Event {
                    event_type,
                    attributes,
                } if event_type == wanted => Some(attributes),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<(String, Attributes)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MonitorEvent::Error {
                    message,
                    attributes,
                } => Some((message, attributes)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn counter_total(&self, wanted: &str) -> u64 {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MonitorEvent::Counter { name, count } if name == wanted => Some(count),
                _ => None,
            })
            .sum()
    }
}

impl Monitor for RecordingMonitor {
    fn notice_error(&self, error: &dyn Error, attributes: Attributes) {
        self.events.lock().unwrap().push(MonitorEvent::Error {
            message: error.to_string(),
            attributes,
        });
    }

    fn record_event(&self, event_type: &str, attributes: Attributes) {
        self.events.lock().unwrap().push(MonitorEvent::Event {
            event_type: event_type.to_string(),
            attributes,
        });
    }

    fn increment_counter(&self, name: &str, count: u64) {
        self.events.lock().unwrap().push(MonitorEvent::Counter {
            name: name.to_string(),
            count,
        });
    }
}

/// Outcome the mock transport reports for every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockOutcome {
    Success,
    Soft,
    Hard,
}

/// Transport that records every batch at call time.
///
/// Sends can be slowed with a delay, or held until permits are released
/// on the gate.
#[derive(Debug)]
pub(crate) struct MockTransport {
    batches: Mutex<Vec<LogBatch>>,
    outcome: MockOutcome,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new(outcome: MockOutcome) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            outcome,
            delay: None,
            gate: None,
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::new(MockOutcome::Success)
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every send until a permit is available on `gate`.
    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn batches(&self) -> Vec<LogBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(LogBatch::len).collect()
    }

    pub(crate) fn sent_messages(&self) -> Vec<String> {
        self.batches()
            .iter()
            .flat_map(|b| b.entries().iter().map(|e| e.message().to_string()))
            .collect()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn start(&self) -> Result<(), TransportError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, batch: LogBatch) -> BoxFuture<'static, SendOutcome> {
        self.batches.lock().unwrap().push(batch);
        let outcome = self.outcome;
        let delay = self.delay;
        let gate = self.gate.clone();

        Box::pin(async move {
            if let Some(gate) = gate {
                // Permits are consumed so each release lets one send through.
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                MockOutcome::Success => SendOutcome::Success,
                MockOutcome::Soft => SendOutcome::SoftFailure {
                    reason: "rate limited".to_string(),
                    error: Some(TransportError::Status {
                        status: 429,
                        body: "slow down".to_string(),
                    }),
                },
                MockOutcome::Hard => SendOutcome::HardFailure(TransportError::Rejected(
                    "batch refused".to_string(),
                )),
            }
        })
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}
