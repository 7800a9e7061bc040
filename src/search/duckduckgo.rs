//! DuckDuckGo search via the HTML endpoint.
//!
//! DuckDuckGo has no free JSON web-search API, so results are scraped from
//! `html.duckduckgo.com`. The page is parsed with a few string strategies
//! rather than a DOM parser; each one adds whatever it finds until
//! `max_results` is reached.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SearchHit, SearchProvider};
use crate::error::SearchError;

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    max_results: usize,
    base_url: String,
    /// Pause before each request; DuckDuckGo throttles bursts
    politeness_delay: Duration,
}

impl DuckDuckGoSearch {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results,
            base_url: DEFAULT_BASE_URL.to_string(),
            politeness_delay: Duration::from_millis(500),
        }
    }

    /// Point the backend at another host (used with a mock server in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    async fn fetch(&self, query: &str) -> Result<String, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        let url = format!("{}/html/?q={}", self.base_url, urlencoding::encode(query));
        debug!(url = %url, "Fetching search results");

        let response = client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(SearchError::RateLimited);
            }
            return Err(SearchError::Http(status.as_u16(), status.to_string()));
        }

        Ok(response.text().await?)
    }

    /// Parse DuckDuckGo HTML into hits.
    fn parse_html(&self, html: &str) -> Vec<SearchHit> {
        let mut results = Vec::new();
        let mut seen = HashSet::new();

        // Result links carry the target in a `uddg=` redirect parameter,
        // usually followed by a `result__snippet` block.
        for segment in html.split("uddg=").skip(1) {
            if results.len() >= self.max_results {
                break;
            }
            let Some(end) = segment.find(['&', '"', '\'']) else {
                continue;
            };
            let Ok(url) = urlencoding::decode(&segment[..end]) else {
                continue;
            };
            let url = url.into_owned();
            if !url.starts_with("http") || url.contains("duckduckgo.com") || !seen.insert(url.clone()) {
                continue;
            }

            let title = anchor_text(&segment[end..])
                .or_else(|| extract_domain(&url))
                .unwrap_or_else(|| "Result".to_string());
            let snippet = snippet_text(segment).unwrap_or_default();
            results.push(SearchHit { title, url, snippet });
        }

        // Fallback: the visible `result__url` links.
        if results.len() < self.max_results {
            for segment in html.split("result__url").skip(1) {
                if results.len() >= self.max_results {
                    break;
                }
                let Some(href_start) = segment.find("href=\"") else {
                    continue;
                };
                let after_href = &segment[href_start + 6..];
                let Some(href_end) = after_href.find('"') else {
                    continue;
                };
                let href = &after_href[..href_end];
                let url = if let Some(rest) = href.strip_prefix("//") {
                    format!("https://{}", rest)
                } else if href.starts_with("http") {
                    href.to_string()
                } else {
                    continue;
                };

                if !url.contains("duckduckgo.com") && seen.insert(url.clone()) {
                    results.push(SearchHit {
                        title: extract_domain(&url).unwrap_or_else(|| "Result".to_string()),
                        url,
                        snippet: String::new(),
                    });
                }
            }
        }

        results.truncate(self.max_results);
        results
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        info!(query = %query, "Performing DuckDuckGo search");

        if !self.politeness_delay.is_zero() {
            tokio::time::sleep(self.politeness_delay).await;
        }

        let body = self.fetch(query).await?;
        let results = self.parse_html(&body);

        if results.is_empty() {
            warn!(query = %query, "No search results found");
        } else {
            info!(query = %query, count = results.len(), "Search completed");
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// Text of the first `<a ...>text</a>` after the current position.
fn anchor_text(rest: &str) -> Option<String> {
    let open_end = rest.find('>')?;
    let after = &rest[open_end + 1..];
    let close = after.find("</a>")?;
    let text = strip_tags(&after[..close]);
    (!text.is_empty()).then_some(text)
}

fn snippet_text(segment: &str) -> Option<String> {
    let start = segment.find("result__snippet")?;
    let rest = &segment[start..];
    let open_end = rest.find('>')?;
    let after = &rest[open_end + 1..];
    let close = after.find("</a>").or_else(|| after.find("</div>"))?;
    let text = strip_tags(&after[..close]);
    (!text.is_empty()).then_some(text)
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .trim()
        .to_string()
}

/// Extract the domain name from a URL.
fn extract_domain(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split('/')
        .next()
        .map(|s| s.to_string())
}
