//! HTTP transport for sending log batches to the ingestion endpoint.
//!
//! This module provides an async HTTP client with connection pooling,
//! request-level retry with exponential backoff, and the mapping from HTTP
//! results to [`SendOutcome`].

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::ForwarderConfig;
use crate::entry::{LogBatch, LogEntry};
use crate::transport::{SendOutcome, Transport, TransportError};

/// Header carrying the API credential.
pub const LICENSE_KEY_HEADER: &str = "X-License-Key";

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between retries (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// HTTP transport posting batches as JSON.
///
/// The client reuses pooled connections, retries timeouts, connection
/// errors, 5xx and 429 responses with exponential backoff, and honours
/// `Retry-After` on 429. A batch delivered only after retrying is reported
/// as a soft failure; one that never gets through is a hard failure.
///
/// # Example
///
/// ```no_run
/// use log_forwarder::client::HttpTransport;
/// use log_forwarder::config::ForwarderConfig;
///
/// let config = ForwarderConfig::default();
/// let transport = HttpTransport::new(&config, "my-license-key")
///     .expect("Failed to create transport");
/// assert_eq!(transport.endpoint(), config.endpoint);
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,

    /// URL for the log ingestion endpoint
    endpoint: String,

    license_key: String,

    /// Maximum number of retry attempts
    max_retries: u32,

    /// Request timeout duration
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Config` if the HTTP client cannot be built.
    pub fn new(config: &ForwarderConfig, license_key: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_settings(
            config.endpoint.clone(),
            license_key,
            config.request_timeout,
            config.max_send_retries,
        )
    }

    /// Create a transport with custom settings.
    pub fn with_settings(
        endpoint: impl Into<String>,
        license_key: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            license_key: license_key.into(),
            max_retries,
            timeout,
        })
    }

    /// Send a batch, retrying transient failures.
    pub async fn send_batch(&self, batch: &LogBatch) -> SendOutcome {
        let batch_size = batch.len();
        let batch_id = batch.batch_id();

        let payload = encode_payload(batch);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => return SendOutcome::HardFailure(TransportError::Encode(e)),
        };

        debug!(
            batch_size = batch_size,
            batch_id = %batch_id,
            url = %self.endpoint,
            "Sending log batch"
        );

        let mut last_error: Option<TransportError> = None;
        let mut retry_after: Option<Duration> = None;
        let mut attempt = 0;

        while attempt <= self.max_retries {
            if attempt > 0 {
                let delay = retry_after
                    .take()
                    .unwrap_or_else(|| calculate_backoff_delay(attempt - 1));
                warn!(
                    attempt = attempt,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    batch_id = %batch_id,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_request(body.clone()).await {
                Ok(()) => {
                    info!(batch_size = batch_size, batch_id = %batch_id, attempts = attempt + 1, "Successfully sent log batch");
                    return match last_error {
                        None => SendOutcome::Success,
                        Some(e) => SendOutcome::SoftFailure {
                            reason: format!("Batch delivered after {} attempts", attempt + 1),
                            error: Some(e),
                        },
                    };
                }
                Err((e, wait)) => {
                    let retryable = is_retryable_error(&e);

                    if retryable && attempt < self.max_retries {
                        warn!(
                            error = %e,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Request failed, will retry"
                        );
                        retry_after = wait;
                        last_error = Some(e);
                        attempt += 1;
                    } else {
                        error!(
                            error = %e,
                            attempts = attempt + 1,
                            retryable = retryable,
                            "Request failed permanently"
                        );
                        if retryable && self.max_retries > 0 {
                            return SendOutcome::HardFailure(TransportError::RetriesExhausted {
                                attempts: attempt + 1,
                                last_error: e.to_string(),
                            });
                        }
                        return SendOutcome::HardFailure(e);
                    }
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        SendOutcome::HardFailure(TransportError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Send a single HTTP request without retry logic. On failure, also
    /// returns the wait requested by the server, if any.
    async fn send_request(&self, body: Vec<u8>) -> Result<(), (TransportError, Option<Duration>)> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header(LICENSE_KEY_HEADER, &self.license_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| (TransportError::from(e), None))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let wait = if status == StatusCode::TOO_MANY_REQUESTS {
            parse_retry_after(response.headers())
        } else {
            None
        };
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err((
            TransportError::Status {
                status: status.as_u16(),
                body,
            },
            wait,
        ))
    }

    /// Get the configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the request timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for HttpTransport {
    fn send(&self, batch: LogBatch) -> BoxFuture<'static, SendOutcome> {
        let transport = self.clone();
        Box::pin(async move { transport.send_batch(&batch).await })
    }
}

/// Render a batch as the ingestion payload:
/// `[{"common": {"attributes": {..}}, "logs": [{"timestamp", "message", "attributes"}]}]`.
pub fn encode_payload(batch: &LogBatch) -> Value {
    let logs: Vec<Value> = batch.entries().iter().map(encode_entry).collect();
    json!([{
        "common": { "attributes": batch.attributes() },
        "logs": logs,
    }])
}

fn encode_entry(entry: &LogEntry) -> Value {
    let mut attributes: Map<String, Value> = entry
        .attributes()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    attributes.insert("level".to_string(), json!(entry.level()));
    if let Some(error) = entry.error() {
        attributes.insert("error.class".to_string(), json!(error.class));
        attributes.insert("error.message".to_string(), json!(error.message));
        if let Some(stack) = &error.stack {
            attributes.insert("error.stack".to_string(), json!(stack));
        }
    }

    json!({
        "timestamp": entry.timestamp().timestamp_millis(),
        "message": entry.message(),
        "attributes": attributes,
    })
}

/// Calculate the backoff delay for a given retry attempt.
///
/// Uses exponential backoff with jitter:
/// delay = min(base_delay * 2^attempt + jitter, max_delay)
fn calculate_backoff_delay(attempt: u32) -> Duration {
    let base_delay = DEFAULT_BASE_DELAY_MS;

    // Calculate exponential delay: base * 2^attempt
    let exponential_delay = base_delay.saturating_mul(1 << attempt.min(10));

    // Add jitter (up to 25% of the delay)
    let jitter = rand::random::<u64>() % (exponential_delay / 4 + 1);

    let total_delay = exponential_delay.saturating_add(jitter).min(MAX_RETRY_DELAY_MS);

    Duration::from_millis(total_delay)
}

/// Parse a `Retry-After` header given in seconds, capped at the maximum
/// retry delay.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds).min(Duration::from_millis(MAX_RETRY_DELAY_MS)))
}

/// Check if an error is retryable.
///
/// Retryable errors include:
/// - Connection errors
/// - Timeouts
/// - Server errors (5xx)
/// - Rate limiting (429)
fn is_retryable_error(error: &TransportError) -> bool {
    match error {
        TransportError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
        TransportError::Timeout => true,
        TransportError::Status { status, .. } => {
            *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
        }
        _ => false,
    }
}
