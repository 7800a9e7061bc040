//! # Search Module
//!
//! Web search used by the research agent. Two real backends are available:
//!
//! - [`TavilySearch`] when a `TAVILY_API_KEY` is configured
//! - [`DuckDuckGoSearch`] otherwise (free, HTML scraping, no key)
//!
//! A search failure is never fatal; the research agent records it and falls
//! back to the model's own knowledge.

mod duckduckgo;
pub mod mock;
mod tavily;

pub use duckduckgo::DuckDuckGoSearch;
pub use tavily::TavilySearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::SearchError;

/// Represents a single search result from the web.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run `query` and return results in relevance order (possibly none).
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Pick the search backend the configuration asks for.
pub fn from_config(config: &Config) -> Arc<dyn SearchProvider> {
    match &config.tavily_api_key {
        Some(key) => {
            info!("Using Tavily for web search");
            Arc::new(TavilySearch::new(key.clone(), config.max_search_results))
        }
        None => {
            info!("Using DuckDuckGo for web search");
            Arc::new(DuckDuckGoSearch::new(config.max_search_results))
        }
    }
}

/// Format hits as a numbered list for an LLM prompt.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}\n   {}\n   Source: {}\n", i + 1, r.title, r.snippet, r.url))
        .collect::<Vec<_>>()
        .join("\n")
}
