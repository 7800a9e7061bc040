//! In-memory search backend for tests and offline runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{SearchHit, SearchProvider};
use crate::error::SearchError;

/// Returns the same canned outcome for every query.
pub struct StaticSearch {
    outcome: Result<Vec<SearchHit>, SearchError>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            outcome: Ok(hits),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_hits(Vec::new())
    }

    pub fn failing(error: SearchError) -> Self {
        Self {
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        "static"
    }
}
