//! Per-entry retry backoff.
//!
//! An entry that cannot be placed in the buffer is wrapped in a
//! [`RetryableEntry`]. Each call to [`RetryableEntry::next_wait`] advances its
//! backoff cursor: the wait doubles from `initial_delay` up to `max_delay`,
//! and after `max_attempts` calls the cursor reports exhaustion with `None`.
//!
//! ```rust
//! use std::time::Duration;
//! use log_forwarder::retry::{Backoff, RetrySettings};
//!
//! let mut backoff = Backoff::new(RetrySettings {
//!     initial_delay: Duration::from_millis(50),
//!     max_delay: Duration::from_millis(150),
//!     max_attempts: 3,
//! });
//! assert_eq!(backoff.next_wait(), Some(Duration::from_millis(50)));
//! assert_eq!(backoff.next_wait(), Some(Duration::from_millis(100)));
//! assert_eq!(backoff.next_wait(), Some(Duration::from_millis(150)));
//! assert_eq!(backoff.next_wait(), None);
//! ```

use std::time::Duration;

use crate::entry::LogEntry;

/// Default wait before the first resubmission.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(50);

/// Default ceiling for a single wait.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Default number of resubmissions before an entry is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Shape of the backoff sequence attached to each retried entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Doubling-with-ceiling backoff cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    settings: RetrySettings,
    attempts: u32,
}

impl Backoff {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            attempts: 0,
        }
    }

    /// Advance the cursor and return how long to wait before the next
    /// resubmission, or `None` once the attempts are exhausted.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if self.attempts >= self.settings.max_attempts {
            return None;
        }
        let exponent = self.attempts.min(31);
        self.attempts += 1;

        let wait = self
            .settings
            .initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.settings.max_delay);
        Some(wait.min(self.settings.max_delay))
    }

    /// Number of waits handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.settings.max_attempts
    }
}

/// A log entry paired with its backoff cursor.
#[derive(Debug, Clone)]
pub struct RetryableEntry {
    entry: LogEntry,
    backoff: Backoff,
}

impl RetryableEntry {
    pub fn new(entry: LogEntry, settings: RetrySettings) -> Self {
        Self {
            entry,
            backoff: Backoff::new(settings),
        }
    }

    pub fn entry(&self) -> &LogEntry {
        &self.entry
    }

    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// See [`Backoff::next_wait`].
    pub fn next_wait(&mut self) -> Option<Duration> {
        self.backoff.next_wait()
    }

    pub(crate) fn into_parts(self) -> (LogEntry, Backoff) {
        (self.entry, self.backoff)
    }

    pub(crate) fn from_parts(entry: LogEntry, backoff: Backoff) -> Self {
        Self { entry, backoff }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogLevel;

    #[test]
    fn test_default_settings() {
        let settings = RetrySettings::default();
        assert_eq!(settings.initial_delay, Duration::from_millis(50));
        assert_eq!(settings.max_delay, Duration::from_secs(5));
        assert_eq!(settings.max_attempts, 8);
    }

    #[test]
    fn test_waits_are_non_decreasing_then_exhausted() {
        let mut backoff = Backoff::new(RetrySettings::default());

        let waits: Vec<Duration> = std::iter::from_fn(|| backoff.next_wait()).collect();
        assert_eq!(waits.len(), 8);
        assert!(waits.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(waits[0], Duration::from_millis(50));
        assert_eq!(waits[1], Duration::from_millis(100));
        assert_eq!(*waits.last().unwrap(), Duration::from_secs(5));
        assert!(backoff.is_exhausted());
    }

    #[test]
    fn test_exhaustion_is_sticky() {
        let mut backoff = Backoff::new(RetrySettings {
            max_attempts: 1,
            ..RetrySettings::default()
        });
        assert!(backoff.next_wait().is_some());
        assert_eq!(backoff.next_wait(), None);
        assert_eq!(backoff.next_wait(), None);
        assert_eq!(backoff.attempts(), 1);
    }

    #[test]
    fn test_large_attempt_counts_stay_capped() {
        let mut backoff = Backoff::new(RetrySettings {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 100,
        });
        let last = std::iter::from_fn(|| backoff.next_wait()).last().unwrap();
        assert_eq!(last, Duration::from_secs(10));
    }

    #[test]
    fn test_retryable_entry_keeps_cursor_across_parts() {
        let mut retryable =
            RetryableEntry::new(LogEntry::new(LogLevel::Info, "later"), RetrySettings::default());
        retryable.next_wait();

        let (entry, backoff) = retryable.into_parts();
        let mut retryable = RetryableEntry::from_parts(entry, backoff);
        assert_eq!(retryable.attempts(), 1);
        assert_eq!(retryable.next_wait(), Some(Duration::from_millis(100)));
        assert_eq!(retryable.entry().message(), "later");
    }
}
