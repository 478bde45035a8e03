//! Log Forwarder - forwards log lines from stdin to a log ingestion endpoint
//!
//! Each line read from stdin becomes one log entry. Lines that parse as a
//! JSON object use its `message`, `level` and `attributes` fields; anything
//! else is forwarded verbatim at INFO level. The forwarder shuts down
//! gracefully on EOF or Ctrl+C.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `LOG_FORWARDER_ENDPOINT`: ingestion URL (default: https://log-api.newrelic.com/log/v1)
//! - `LOG_FORWARDER_LICENSE_KEY`: API credential (required)
//! - `LOG_FORWARDER_MAX_LOGS_PER_BATCH`: entries per batch (default: 10000)
//! - `LOG_FORWARDER_FLUSH_INTERVAL_SECS`: seconds between timer flushes (default: 1)
//! - `LOG_FORWARDER_MAX_TERMINATION_SECS`: shutdown deadline (default: 10)
//! - `LOG_FORWARDER_ENTITY_NAME`: `entity.name` attached to every batch
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use log_forwarder::{ForwarderConfig, LogEntry, LogForwarder, LogLevel, StaticMetadata};

const PLUGIN_TYPE: &str = "log-forwarder-stdin";

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    info!("Starting Log Forwarder...");

    let config = match ForwarderConfig::from_env() {
        Ok(config) => {
            info!(
                endpoint = %config.endpoint,
                max_logs_per_batch = config.max_logs_per_batch,
                flush_interval_secs = config.flush_interval.as_secs(),
                max_send_retries = config.max_send_retries,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let mut forwarder = match LogForwarder::builder(PLUGIN_TYPE, config)
        .metadata(Arc::new(StaticMetadata::from_env()))
        .build()
    {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!(error = %e, "Failed to create log forwarder");
            std::process::exit(1);
        }
    };

    if let Err(e) = forwarder.start() {
        error!(error = %e, "Failed to start log forwarder");
        std::process::exit(1);
    }

    info!("Log Forwarder running. Reading stdin, press Ctrl+C to stop.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(entry) = parse_line(&line) {
                        forwarder.append(entry);
                    }
                }
                Ok(None) => {
                    info!("End of input reached, stopping...");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin, stopping...");
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Shutdown signal received, stopping..."),
                    Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                }
                break;
            }
        }
    }

    forwarder.shutdown().await;

    let stats = forwarder.stats();
    info!(
        entries_appended = stats.entries_appended,
        entries_sent = stats.entries_sent,
        entries_dropped = stats.entries_dropped,
        "Log Forwarder stopped"
    );
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Turn one input line into an entry. Blank lines are skipped.
fn parse_line(line: &str) -> Option<LogEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let object = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(object)) => object,
        _ => return Some(LogEntry::new(LogLevel::Info, trimmed)),
    };

    let level = object
        .get("level")
        .and_then(Value::as_str)
        .and_then(|level| level.parse().ok())
        .unwrap_or(LogLevel::Info);
    let message = match object.get("message") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => trimmed.to_string(),
    };

    let mut entry = LogEntry::new(level, message);
    if let Some(Value::Object(attributes)) = object.get("attributes") {
        entry = entry.with_attributes(attributes.clone());
    }
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_line_is_info() {
        let entry = parse_line("  service started  ").unwrap();
        assert_eq!(entry.message(), "service started");
        assert_eq!(entry.level(), LogLevel::Info);
    }

    #[test]
    fn test_blank_line_is_skipped() {
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn test_json_line() {
        let entry = parse_line(
            r#"{"message": "disk full", "level": "warning", "attributes": {"disk": "/var"}}"#,
        )
        .unwrap();
        assert_eq!(entry.message(), "disk full");
        assert_eq!(entry.level(), LogLevel::Warn);
        assert_eq!(entry.attributes().get("disk"), Some(&json!("/var")));
    }

    #[test]
    fn test_json_line_with_unknown_level_defaults_to_info() {
        let entry = parse_line(r#"{"message": "hi", "level": "loud"}"#).unwrap();
        assert_eq!(entry.level(), LogLevel::Info);
    }

    #[test]
    fn test_json_array_is_forwarded_verbatim() {
        let entry = parse_line("[1, 2]").unwrap();
        assert_eq!(entry.message(), "[1, 2]");
    }
}
