//! Named task helpers.
//!
//! Long-lived forwarder tasks get a numbered name per base name
//! (`log-batcher-scheduler-1`, `log-batcher-scheduler-2`, ...) so that the
//! tasks of several forwarders in one process can be told apart in logs.
//! Task deadlines are computed with [`deadline_after`], which never panics.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};

/// Roughly 30 years; stands in for "never" when a deadline overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `duration` from now, saturating to a far-future instant when
/// the addition would overflow.
pub fn deadline_after(duration: Duration) -> Instant {
    saturating_add(Instant::now(), duration)
}

/// `instant + duration`, saturating like [`deadline_after`].
pub fn saturating_add(instant: Instant, duration: Duration) -> Instant {
    instant
        .checked_add(duration)
        .or_else(|| instant.checked_add(FAR_FUTURE))
        .unwrap_or(instant)
}

fn counters() -> &'static Mutex<HashMap<String, usize>> {
    static COUNTERS: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();
    COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Return `base` suffixed with the next number for that base, starting at 1.
pub fn numbered_name(base: &str) -> String {
    let mut counters = counters().lock().unwrap_or_else(|e| e.into_inner());
    let counter = counters.entry(base.to_string()).or_insert(0);
    *counter += 1;
    format!("{}-{}", base, counter)
}

/// Spawn `future` on the current runtime inside a span carrying a numbered
/// task name.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_named<F>(base: &str, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let name = numbered_name(base);
    debug!(task = %name, "Spawning task");
    let span = info_span!("task", name = %name);
    tokio::spawn(future.instrument(span))
}
