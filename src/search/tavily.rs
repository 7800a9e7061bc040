//! Tavily Search backend.
//!
//! - HTTP timeout and retry with exponential backoff on transient failures
//! - Typed errors for rate limits, auth failures and server errors

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SearchHit, SearchProvider};
use crate::error::SearchError;

/// Default timeout for Tavily API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 1000;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

pub struct TavilySearch {
    api_key: String,
    client: Client,
    base_url: String,
    max_results: usize,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, max_results: usize) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_results,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    async fn execute_with_retry(&self, request: &TavilyRequest<'_>) -> Result<TavilyResponse, SearchError> {
        let mut attempt = 0;
        loop {
            match self.execute_single_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Tavily request failed, will retry");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_single_request(&self, request: &TavilyRequest<'_>) -> Result<TavilyResponse, SearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SearchError::Parse(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 => Err(SearchError::Unauthorized),
            429 => Err(SearchError::RateLimited),
            code => Err(SearchError::Http(code, error_text)),
        }
    }
}

/// Request body for Tavily API
#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    include_answer: bool,
}

/// Response from Tavily API
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        info!(query = %query, "Performing Tavily search");

        let request = TavilyRequest {
            query,
            max_results: self.max_results,
            search_depth: "basic",
            include_answer: false,
        };
        let response = self.execute_with_retry(&request).await?;

        debug!(count = response.results.len(), "Tavily returned results");

        Ok(response
            .results
            .into_iter()
            .take(self.max_results)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
