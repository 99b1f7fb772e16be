//! JSON-over-HTTP client shared by the remote embedding and generation backends.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{service} connection error (is it running at {url}?): {message}")]
    Connection {
        service: &'static str,
        url: String,
        message: String,
    },
    #[error("{service} API error {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned an unreadable response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

/// A reqwest client bound to one remote service, with retry and backoff.
#[derive(Debug, Clone)]
pub struct JsonClient {
    client: reqwest::Client,
    service: &'static str,
    max_retries: u32,
    backoff: Duration,
}

impl JsonClient {
    pub fn new(service: &'static str, timeout_secs: u64, max_retries: u32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            service,
            max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Base delay before the first retry; doubles on each further attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// POST `body` as JSON and return the decoded JSON response.
    pub async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<Value, HttpError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                tracing::debug!(
                    service = self.service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(token) = bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| HttpError::Decode {
                            service: self.service,
                            message: e.to_string(),
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = HttpError::Status {
                        service: self.service,
                        status: status.as_u16(),
                        body: body_text,
                    };

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(service = self.service, %status, "transient API error");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(HttpError::Connection {
                        service: self.service,
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| HttpError::Connection {
            service: self.service,
            url: url.to_string(),
            message: "request failed after retries".to_string(),
        }))
    }
}
