use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use shared_logging::LogLevel;
use thiserror::Error;
use tokio::time::sleep;

use crate::telemetry::DriverTelemetry;

/// Opaque identifier for one accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle(String);

impl RunHandle {
    /// Wraps a raw run identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Error reported when the retry budget is spent without an acceptance.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Every attempt failed.
    #[error("no successful post after {attempts} attempts")]
    RetriesExhausted {
        /// Total attempts made (budget + 1).
        attempts: u64,
    },
}

/// Transport seam between the submission client and the wire.
///
/// Implementations return `Err` for connection failures and non-success
/// statuses alike; the client treats both as retryable.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs a JSON document, returning the parsed response body.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
    /// GETs a JSON document.
    async fn get_json(&self, url: &str) -> Result<Value>;
}

/// Production transport over a shared reqwest client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds the transport.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("tau-driver/0.1")
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("Cache-Control", "no-cache")
            .json(body)
            .send()
            .await
            .with_context(|| format!("posting to {url}"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("non-success status from {url}"))?;
        // Acceptance bodies are not guaranteed to be JSON.
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("getting {url}"))?;
        response
            .error_for_status()
            .with_context(|| format!("non-success status from {url}"))?
            .json::<Value>()
            .await
            .with_context(|| format!("invalid json from {url}"))
    }
}

/// Submits request documents with bounded retry and polls runs to
/// completion.
pub struct SubmissionClient {
    transport: Arc<dyn Transport>,
    retry_attempts: u32,
    telemetry: DriverTelemetry,
}

impl SubmissionClient {
    /// Creates a client with the given retry budget.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        retry_attempts: u32,
        telemetry: DriverTelemetry,
    ) -> Self {
        Self {
            transport,
            retry_attempts,
            telemetry,
        }
    }

    /// POSTs `document` to `endpoint`, retrying on any failure.
    ///
    /// The retry counter starts at -1 and the loop continues while it is
    /// below the configured budget, so a budget of N makes N + 1 total
    /// attempts. Returns the run handle from the acceptance body's `id`
    /// field when one is present.
    pub async fn submit(&self, endpoint: &str, document: &Value) -> Result<Option<RunHandle>> {
        let mut retries: i64 = -1;
        let mut attempts: u64 = 0;
        while retries < i64::from(self.retry_attempts) {
            attempts += 1;
            match self.transport.post_json(endpoint, document).await {
                Ok(body) => {
                    let handle = extract_handle(&body);
                    let _ = self.telemetry.log(
                        LogLevel::Info,
                        "driver.submit.accepted",
                        json!({
                            "endpoint": endpoint,
                            "attempts": attempts,
                            "run_id": handle.as_ref().map(RunHandle::id),
                        }),
                    );
                    return Ok(handle);
                }
                Err(err) => {
                    let _ = self.telemetry.log(
                        LogLevel::Warn,
                        "driver.submit.retry",
                        json!({
                            "endpoint": endpoint,
                            "attempt": attempts,
                            "error": format!("{err:#}"),
                        }),
                    );
                    retries += 1;
                }
            }
        }
        let _ = self.telemetry.log(
            LogLevel::Error,
            "driver.submit.exhausted",
            json!({ "endpoint": endpoint, "attempts": attempts }),
        );
        Err(SubmitError::RetriesExhausted { attempts }.into())
    }

    /// Polls the status endpoint for `handle` until reported progress
    /// reaches 1.0.
    ///
    /// An unreachable status endpoint ends polling with a warning; the
    /// absence of confirmed completion is an unknown outcome, not an
    /// error.
    pub async fn await_completion(
        &self,
        endpoint: &str,
        handle: &RunHandle,
        poll_interval: Duration,
    ) -> RunHandle {
        let status_url = format!("{}/{}", endpoint, handle.id());
        loop {
            match self.transport.get_json(&status_url).await {
                Ok(body) => {
                    let progress = body.get("progress").and_then(Value::as_f64).unwrap_or(0.0);
                    if progress >= 1.0 {
                        let _ = self.telemetry.log(
                            LogLevel::Info,
                            "driver.poll.completed",
                            json!({ "run_id": handle.id() }),
                        );
                        return handle.clone();
                    }
                    let _ = self.telemetry.log(
                        LogLevel::Debug,
                        "driver.poll.progress",
                        json!({ "run_id": handle.id(), "progress": progress }),
                    );
                }
                Err(err) => {
                    let _ = self.telemetry.log(
                        LogLevel::Warn,
                        "driver.poll.unreachable",
                        json!({ "run_id": handle.id(), "error": format!("{err:#}") }),
                    );
                    return handle.clone();
                }
            }
            sleep(poll_interval).await;
        }
    }
}

fn extract_handle(body: &Value) -> Option<RunHandle> {
    match body.get("id") {
        Some(Value::String(id)) => Some(RunHandle::new(id.clone())),
        Some(Value::Number(id)) => Some(RunHandle::new(id.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use parking_lot::Mutex;

    /// Stub transport failing a fixed number of posts before succeeding.
    struct FlakyTransport {
        failures_before_success: u64,
        posts: Mutex<u64>,
        gets: Mutex<u64>,
        progress_per_get: f64,
    }

    impl FlakyTransport {
        fn new(failures_before_success: u64) -> Self {
            Self {
                failures_before_success,
                posts: Mutex::new(0),
                gets: Mutex::new(0),
                progress_per_get: 1.0,
            }
        }

        fn post_count(&self) -> u64 {
            *self.posts.lock()
        }

        fn get_count(&self) -> u64 {
            *self.gets.lock()
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn post_json(&self, _url: &str, _body: &Value) -> Result<Value> {
            let mut posts = self.posts.lock();
            *posts += 1;
            if *posts <= self.failures_before_success {
                bail!("simulated 500");
            }
            Ok(json!({ "id": "run-17" }))
        }

        async fn get_json(&self, _url: &str) -> Result<Value> {
            let mut gets = self.gets.lock();
            *gets += 1;
            let progress = (*gets as f64 * self.progress_per_get).min(1.0);
            Ok(json!({ "progress": progress }))
        }
    }

    fn client(transport: Arc<dyn Transport>, retry_attempts: u32) -> SubmissionClient {
        SubmissionClient::new(transport, retry_attempts, DriverTelemetry::disabled())
    }

    #[tokio::test]
    async fn retries_until_success_then_stops() {
        let transport = Arc::new(FlakyTransport::new(3));
        let client = client(transport.clone(), 5);
        let handle = client.submit("http://x/batch", &json!({})).await.unwrap();
        assert_eq!(handle, Some(RunHandle::new("run-17")));
        assert_eq!(transport.post_count(), 4);
    }

    #[tokio::test]
    async fn budget_of_n_makes_n_plus_one_attempts() {
        let transport = Arc::new(FlakyTransport::new(u64::MAX));
        let client = client(transport.clone(), 2);
        let err = client.submit("http://x/batch", &json!({})).await.unwrap_err();
        assert_eq!(transport.post_count(), 3);
        assert!(matches!(
            err.downcast_ref::<SubmitError>(),
            Some(SubmitError::RetriesExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn zero_budget_still_attempts_once() {
        let transport = Arc::new(FlakyTransport::new(u64::MAX));
        let client = client(transport.clone(), 0);
        assert!(client.submit("http://x/batch", &json!({})).await.is_err());
        assert_eq!(transport.post_count(), 1);
    }

    #[tokio::test]
    async fn polls_until_progress_reaches_one() {
        let transport = Arc::new(FlakyTransport {
            failures_before_success: 0,
            posts: Mutex::new(0),
            gets: Mutex::new(0),
            progress_per_get: 0.5,
        });
        let client = client(transport.clone(), 0);
        let handle = RunHandle::new("run-17");
        let done = client
            .await_completion("http://x/scenario", &handle, Duration::from_millis(1))
            .await;
        assert_eq!(done, handle);
        assert_eq!(transport.get_count(), 2);
    }

    #[tokio::test]
    async fn unreachable_status_endpoint_ends_polling() {
        struct Unreachable;
        #[async_trait]
        impl Transport for Unreachable {
            async fn post_json(&self, _url: &str, _body: &Value) -> Result<Value> {
                Ok(Value::Null)
            }
            async fn get_json(&self, _url: &str) -> Result<Value> {
                bail!("connection refused")
            }
        }
        let client = client(Arc::new(Unreachable), 0);
        let handle = RunHandle::new("run-9");
        let done = client
            .await_completion("http://x/scenario", &handle, Duration::from_millis(1))
            .await;
        assert_eq!(done.id(), "run-9");
    }
}
