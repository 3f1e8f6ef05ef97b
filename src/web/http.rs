// src/web/http.rs
use crate::error::ProviderError;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = "AcronymExtractor/1.0 (+https://example.invalid)";

/// Shared JSON fetcher for every provider. One `Client` per engine.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    attempts: u32,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, attempts: u32) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self { client, timeout, attempts: attempts.max(1) })
    }

    /// Maps a client error, reporting timeouts with the configured limit.
    fn request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Network(err.to_string())
        }
    }

    /// GET `url` and parse the body as JSON. 429 and 5xx are retried with
    /// backoff; any other non-200 status fails at once. The caller bounds
    /// the total time.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Value, ProviderError> {
        let mut last_err = ProviderError::Network("no attempt made".to_string());
        for attempt in 0..self.attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt - 1)).await;
            }

            let mut request = self.client.get(url).query(query);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(%url, attempt, error = %e, "request failed");
                    last_err = self.request_error(e);
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                debug!(%url, attempt, status = status.as_u16(), "retryable status");
                last_err = ProviderError::Status(status.as_u16());
                continue;
            }
            if status != StatusCode::OK {
                return Err(ProviderError::Status(status.as_u16()));
            }

            let body = response.text().await.map_err(|e| self.request_error(e))?;
            return Ok(serde_json::from_str(&body)?);
        }
        Err(last_err)
    }
}

/// Exponential with a little jitter, never above 1.5 s.
fn backoff(attempt: u32) -> Duration {
    let base = 0.15 * 2f64.powi(attempt.min(10) as i32);
    let jitter = rand::thread_rng().gen_range(0.0..0.1);
    Duration::from_secs_f64((base + jitter).min(1.5))
}
