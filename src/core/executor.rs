//! Single-request execution against the registry: hard per-attempt timeout,
//! classification of failures, exponential backoff between retries, and
//! immediate abort when the run's cancellation token fires.

use crate::config::settings::FetchSettings;
use crate::domain::model::RetryPolicy;
use crate::utils::error::{EtlError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Upstream bodies quoted in errors are cut to this many characters.
const ERROR_BODY_LIMIT: usize = 300;

enum Failure {
    Retryable {
        reason: String,
        retry_after: Option<Duration>,
    },
    Terminal(EtlError),
}

impl Failure {
    fn transient(reason: impl Into<String>) -> Self {
        Failure::Retryable {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub struct RequestExecutor {
    client: Client,
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// Builds a client carrying the headers the registry's grid endpoints expect.
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        let referer = HeaderValue::from_str(&settings.upstream.referer).map_err(|e| {
            EtlError::InvalidConfigValueError {
                field: "upstream.referer".to_string(),
                value: settings.upstream.referer.clone(),
                reason: e.to_string(),
            }
        })?;
        headers.insert(REFERER, referer);

        let client = Client::builder()
            .user_agent(settings.upstream.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self::with_client(client, settings.retry))
    }

    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get_json(&self, url: &Url, cancel: &CancellationToken) -> Result<serde_json::Value> {
        self.get_json_with(url, cancel, &self.policy).await
    }

    /// Like [`get_json`](Self::get_json) with an explicit policy.
    pub async fn get_json_with(
        &self,
        url: &Url,
        cancel: &CancellationToken,
        policy: &RetryPolicy,
    ) -> Result<serde_json::Value> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(EtlError::Cancelled);
            }

            debug!("GET {} (attempt {}/{})", url, attempt + 1, policy.max_attempts + 1);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EtlError::Cancelled),
                outcome = self.attempt(url, policy.timeout()) => outcome,
            };

            let (reason, retry_after) = match outcome {
                Ok(value) => return Ok(value),
                Err(Failure::Terminal(err)) => return Err(err),
                Err(Failure::Retryable {
                    reason,
                    retry_after,
                }) => (reason, retry_after),
            };

            if attempt >= policy.max_attempts {
                return Err(EtlError::UpstreamUnavailable {
                    attempts: attempt + 1,
                    last_error: reason,
                });
            }

            let delay = policy.backoff_delay(attempt, retry_after);
            warn!(
                "⚠️ {} on attempt {}/{}, retrying in {:?}",
                reason,
                attempt + 1,
                policy.max_attempts + 1,
                delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EtlError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> std::result::Result<serde_json::Value, Failure> {
        match tokio::time::timeout(timeout, self.send(url)).await {
            Ok(result) => result,
            Err(_) => Err(Failure::transient(format!(
                "timeout after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn send(&self, url: &Url) -> std::result::Result<serde_json::Value, Failure> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Err(Failure::Terminal(EtlError::HttpClientError(e))),
            Err(e) => return Err(Failure::transient(format!("network error: {}", e))),
        };

        let status = response.status();
        if is_retryable_status(status) {
            return Err(Failure::Retryable {
                reason: format!("upstream HTTP {}", status.as_u16()),
                retry_after: parse_retry_after(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::Terminal(EtlError::UpstreamStatus {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            }));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Failure::transient(format!("failed to read body: {}", e)))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            let preview: String = String::from_utf8_lossy(&bytes).chars().take(ERROR_BODY_LIMIT).collect();
            Failure::Terminal(EtlError::malformed(format!(
                "response is not JSON ({}): {}",
                e, preview
            )))
        })
    }
}
