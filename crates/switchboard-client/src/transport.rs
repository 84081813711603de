//! JSON-over-HTTP transport: fixed timeout, bearer attachment, status mapping, bounded retry.

use crate::retry::RetryPolicy;
use serde_json::Value;
use std::error::Error as _;
use std::time::Duration;
use switchboard_core::DownstreamError;

/// Longest error body kept in a message.
const MAX_MESSAGE_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(timeout: Duration) -> Result<Self, DownstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownstreamError::Transport(format!("http client init failed: {}", e)))?;
        Ok(Self {
            http,
            timeout,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// POSTs `body` and returns the decoded reply. Transient failures are retried up to
    /// `attempts` times; 4xx never is.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
        attempts: u32,
    ) -> Result<Value, DownstreamError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            let mut req = self.http.post(url).json(body);
            if let Some(token) = bearer.filter(|t| !t.is_empty()) {
                req = req.bearer_auth(token);
            }
            match self.send(req).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let wait = self.retry.backoff(attempt);
                    tracing::warn!(
                        target: "switchboard::transport",
                        url = %url,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value, DownstreamError> {
        let response = req.send().await.map_err(|e| self.map_reqwest(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest(&e))?;

        if !status.is_success() {
            let message = error_message(&text, status.canonical_reason().unwrap_or("request failed"));
            return Err(match status.as_u16() {
                401 | 403 => DownstreamError::Unauthorized {
                    status: status.as_u16(),
                    message,
                },
                code => DownstreamError::Status { status: code, message },
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        // Content previews come back as HTML; anything that is not JSON is kept as text.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    fn map_reqwest(&self, e: &reqwest::Error) -> DownstreamError {
        if e.is_timeout() {
            return DownstreamError::Timeout {
                after_secs: self.timeout.as_secs(),
            };
        }
        let kind = if e.is_connect() { "connect" } else { "request" };
        let mut message = format!("{} error: {}", kind, e);
        if let Some(cause) = e.source() {
            let cause = cause.to_string();
            if !message.contains(&cause) {
                message.push_str(&format!(" ({})", cause));
            }
        }
        DownstreamError::Transport(message)
    }
}

/// `error`/`details`/`message` from a JSON error body, else the raw body, else `fallback`.
fn error_message(body: &str, fallback: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    if let Ok(Value::Object(m)) = serde_json::from_str::<Value>(trimmed) {
        let pick = |k: &str| m.get(k).and_then(Value::as_str).filter(|s| !s.is_empty());
        match (pick("error").or_else(|| pick("message")), pick("details")) {
            (Some(e), Some(d)) => return format!("{}: {}", e, d),
            (Some(e), None) => return e.to_string(),
            (None, Some(d)) => return d.to_string(),
            (None, None) => {}
        }
    }
    trimmed.chars().take(MAX_MESSAGE_LEN).collect()
}
