//! HTTP transport for chat completions
//!
//! POSTs JSON to the model API, retrying rate limits, timeouts and server
//! errors with exponential backoff.

use crate::error::{ChatDbError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retries after the first attempt
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff before the first retry (ms); doubles each time
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Retrying JSON client for one model provider
#[derive(Clone, Debug)]
pub struct LLMHttpClient {
    client: Client,
    /// Provider name used in error messages
    provider: String,
    max_retries: u32,
    initial_delay_ms: u64,
}

impl LLMHttpClient {
    /// Client with the default timeout
    pub fn new(provider: impl Into<String>) -> Result<Self> {
        Self::with_timeout(provider, DEFAULT_TIMEOUT_SECS)
    }

    /// Client whose requests give up after `timeout_secs`
    pub fn with_timeout(provider: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            provider: provider.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
        })
    }

    /// Override how many times a failed request is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the first backoff delay (ms)
    pub fn with_retry_delay(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    /// POST `body` and return the successful response text
    pub async fn post_with_retry<T: Serialize>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &T,
    ) -> Result<String> {
        let response = self.send_with_retry(url, headers, body).await?;
        Ok(response.text().await?)
    }

    /// Make a POST request with retry logic and return the successful response
    ///
    /// The body is left unread so callers can stream it.
    pub async fn send_with_retry<T: Serialize>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &T,
    ) -> Result<Response> {
        let mut attempt = 0;

        loop {
            debug!("{} request attempt {}", self.provider, attempt + 1);

            let result = self
                .client
                .post(url)
                .headers(headers.clone())
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if !self.should_retry(status, attempt) {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unable to read response body".to_string());
                        return Err(ChatDbError::llm_api(
                            &self.provider,
                            status.as_u16(),
                            extract_error_message(&body),
                        ));
                    }
                    warn!(
                        "{} request failed with {} (attempt {}), retrying",
                        self.provider,
                        status,
                        attempt + 1
                    );
                }
                Err(e) => {
                    if !(e.is_timeout() || e.is_connect()) || attempt >= self.max_retries {
                        return Err(ChatDbError::Http(e));
                    }
                    warn!(
                        "{} request failed (attempt {}), retrying: {}",
                        self.provider,
                        attempt + 1,
                        e
                    );
                }
            }

            tokio::time::sleep(Duration::from_millis(self.calculate_delay(attempt))).await;
            attempt += 1;
        }
    }

    /// Whether a response with `status` is worth another attempt
    fn should_retry(&self, status: StatusCode, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        // Rate limiting, timeouts and server errors
        status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
    }

    /// Backoff before retry number `attempt + 1`
    fn calculate_delay(&self, attempt: u32) -> u64 {
        self.initial_delay_ms * 2_u64.pow(attempt)
    }

    /// JSON content type plus bearer authentication
    pub fn build_headers(api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| ChatDbError::Config("API key contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Pull the human-readable message out of an API error body
pub fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string())
}
