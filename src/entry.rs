//! Log entry and batch types.
//!
//! A [`LogEntry`] is built once by an adapter at log time and never mutated
//! afterwards. A [`LogBatch`] is an immutable snapshot created by the forwarder
//! worker at flush time and handed to the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use uuid::Uuid;

use crate::config;

/// Key/value attributes attached to entries, batches and monitoring events.
pub type Attributes = HashMap<String, serde_json::Value>;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Get all possible log levels.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Fatal,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    /// Accepts the level names used by the common logging frameworks, so
    /// adapters can pass their native level through unchanged.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" | "FINEST" | "FINER" | "ALL" => Ok(LogLevel::Trace),
            "DEBUG" | "FINE" | "CONFIG" => Ok(LogLevel::Debug),
            "INFO" | "INFORMATION" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" | "SEVERE" | "ERR" => Ok(LogLevel::Error),
            "FATAL" | "CRITICAL" => Ok(LogLevel::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Error details associated with a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Type name of the error
    pub class: String,

    /// Rendered error message
    pub message: String,

    /// Rendered cause chain, one line per cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorInfo {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture an error, rendering its `source()` chain as the stack.
    ///
    /// The chain is truncated to [`config::max_stack_size`] lines.
    pub fn from_error<E: Error + 'static>(error: &E) -> Self {
        let info = Self::new(std::any::type_name::<E>(), error.to_string());
        match render_cause_chain(error, config::max_stack_size()) {
            Some(stack) => info.with_stack(stack),
            None => info,
        }
    }
}

pub(crate) fn render_cause_chain(error: &dyn Error, max_lines: usize) -> Option<String> {
    let mut lines = Vec::new();
    let mut cause = error.source();
    while let Some(err) = cause {
        if lines.len() >= max_lines {
            break;
        }
        lines.push(format!("caused by: {}", err));
        cause = err.source();
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n") + "\n")
    }
}

/// A single log record accepted by the forwarder.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    message: String,
    level: LogLevel,
    timestamp: DateTime<Utc>,
    attributes: Attributes,
    error: Option<ErrorInfo>,
}

impl LogEntry {
    /// Create a new log entry stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp: Utc::now(),
            attributes: Attributes::new(),
            error: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Merge attributes into the entry; existing keys are overwritten.
    pub fn with_attributes<I, K>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }
}

/// An immutable group of entries dispatched together to the transport.
#[derive(Debug, Clone)]
pub struct LogBatch {
    batch_id: Uuid,
    entries: Vec<LogEntry>,
    attributes: Attributes,
}

impl LogBatch {
    pub(crate) fn new(entries: Vec<LogEntry>, attributes: Attributes) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            entries,
            attributes,
        }
    }

    /// Random id used to correlate log lines about this batch.
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Batch-level attributes shared by every entry.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Get the number of logs in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Inner;

    #[derive(Debug, thiserror::Error)]
    #[error("request failed")]
    struct Outer(#[source] Inner);

    #[test]
    fn test_level_parsing_accepts_framework_names() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("SEVERE".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("fine".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" info ".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_display_and_serde() {
        assert_eq!(LogLevel::Error.to_string(), "ERROR");
        assert_eq!(serde_json::to_value(LogLevel::Warn).unwrap(), json!("WARN"));
        for level in LogLevel::all() {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), *level);
        }
    }

    #[test]
    fn test_entry_builder() {
        let entry = LogEntry::new(LogLevel::Info, "started")
            .with_attribute("thread.name", "main")
            .with_attributes([("logger.name", json!("app")), ("thread.name", json!("worker-1"))]);

        assert_eq!(entry.message(), "started");
        assert_eq!(entry.level(), LogLevel::Info);
        assert_eq!(entry.attributes().get("logger.name"), Some(&json!("app")));
        assert_eq!(entry.attributes().get("thread.name"), Some(&json!("worker-1")));
        assert!(entry.error().is_none());
    }

    #[test]
    fn test_error_info_renders_cause_chain() {
        let info = ErrorInfo::from_error(&Outer(Inner));

        assert!(info.class.ends_with("Outer"));
        assert_eq!(info.message, "request failed");
        assert_eq!(info.stack.as_deref(), Some("caused by: connection reset\n"));
    }

    #[test]
    fn test_error_info_without_source_has_no_stack() {
        let info = ErrorInfo::from_error(&Inner);
        assert!(info.stack.is_none());
    }

    #[test]
    fn test_cause_chain_truncated() {
        assert_eq!(render_cause_chain(&Outer(Inner), 0), None);
    }

    #[test]
    fn test_batch_accessors() {
        let entries = vec![
            LogEntry::new(LogLevel::Info, "a"),
            LogEntry::new(LogLevel::Info, "b"),
        ];
        let mut attributes = Attributes::new();
        attributes.insert("plugin.type".to_string(), json!("test"));

        let batch = LogBatch::new(entries, attributes);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(batch.entries()[1].message(), "b");
        assert_eq!(batch.attributes().get("plugin.type"), Some(&json!("test")));
        assert_ne!(batch.batch_id(), LogBatch::new(vec![], Attributes::new()).batch_id());
    }
}
