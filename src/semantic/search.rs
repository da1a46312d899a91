//! Semantic search over folders of bookmarks.
//!
//! Embeds the query once and every bookmark's `title + " " + url`, ranks by
//! cosine similarity and drops everything at or below the threshold. When the
//! provider is unavailable, falls back to substring matching.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bookmarks::{BookmarkItem, FolderContext};
use crate::config::SemanticSearchConfig;
use crate::semantic::lexical::substring_matches;
use crate::semantic::provider::{EmbeddingProvider, ProviderState};
use crate::semantic::similarity::cosine_similarity;
use crate::semantic::DEFAULT_THRESHOLD;

/// A bookmark with its score and the folder it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResult {
    pub title: String,
    pub url: String,
    pub score: f32,
    pub folder_title: String,
}

impl ScoredResult {
    pub fn new(bookmark: &BookmarkItem, score: f32, folder_title: &str) -> Self {
        Self {
            title: bookmark.title.clone(),
            url: bookmark.url.clone(),
            score,
            folder_title: folder_title.to_string(),
        }
    }

    pub fn bookmark(&self) -> BookmarkItem {
        BookmarkItem::new(self.title.clone(), self.url.clone())
    }
}

/// Stateless search engine; cheap to clone and safe to call repeatedly.
#[derive(Clone)]
pub struct SemanticSearch {
    provider: Arc<EmbeddingProvider>,
    threshold: f32,
    debounce: Duration,
}

impl SemanticSearch {
    pub fn new(provider: Arc<EmbeddingProvider>) -> Self {
        Self {
            provider,
            threshold: DEFAULT_THRESHOLD,
            debounce: Duration::ZERO,
        }
    }

    pub fn from_config(provider: Arc<EmbeddingProvider>, config: &SemanticSearchConfig) -> Self {
        Self::new(provider)
            .with_threshold(config.threshold)
            .with_debounce(Duration::from_millis(config.debounce_ms))
    }

    /// Results must score strictly above `threshold`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Quiet period `search_debounced` waits before doing any work.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Rank every bookmark in `corpus` against `query`.
    ///
    /// Never fails: an unavailable provider (or a query that cannot be
    /// embedded) degrades to substring matching, and bookmarks that cannot be
    /// embedded are skipped.
    pub async fn search(&self, query: &str, corpus: &[FolderContext]) -> Vec<ScoredResult> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        if self.provider.ensure_ready().await == ProviderState::Unavailable {
            return substring_matches(query, corpus);
        }

        let query_embedding = match self.provider.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                log::warn!("Failed to embed query, using substring matching: {}", e);
                return substring_matches(query, corpus);
            }
        };

        let mut results = Vec::new();
        for folder in corpus {
            for bookmark in &folder.bookmarks {
                let embedding = match self.provider.embed(&bookmark.search_text()).await {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        log::warn!("Skipping bookmark {:?}: {}", bookmark.url, e);
                        continue;
                    }
                };

                let score = match cosine_similarity(&query_embedding, &embedding) {
                    Ok(score) => score,
                    Err(e) => {
                        log::warn!("Skipping bookmark {:?}: {}", bookmark.url, e);
                        continue;
                    }
                };

                // NaN fails this comparison too
                if score > self.threshold {
                    results.push(ScoredResult::new(bookmark, score, &folder.title));
                }
            }
        }

        // Sort by score descending, ties keep corpus order
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }

    /// Run a search under `gate`, returning `None` if a newer query started
    /// before this one finished.
    pub async fn search_latest(
        &self,
        gate: &QueryGate,
        query: &str,
        corpus: &[FolderContext],
    ) -> Option<Vec<ScoredResult>> {
        let ticket = gate.begin();
        let results = self.search(query, corpus).await;
        gate.is_current(ticket).then_some(results)
    }

    /// Like `search_latest`, but first waits out the debounce period and
    /// skips the search entirely if a newer query arrived meanwhile.
    pub async fn search_debounced(
        &self,
        gate: &QueryGate,
        query: &str,
        corpus: &[FolderContext],
    ) -> Option<Vec<ScoredResult>> {
        let ticket = gate.begin();
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }
        if !gate.is_current(ticket) {
            log::debug!("Query {:?} superseded before it started", query);
            return None;
        }

        let results = self.search(query, corpus).await;
        gate.is_current(ticket).then_some(results)
    }
}

/// Generation counter letting callers discard results of superseded queries.
#[derive(Debug, Default)]
pub struct QueryGate {
    generation: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTicket(u64);

impl QueryGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new query; every earlier ticket becomes stale.
    pub fn begin(&self) -> QueryTicket {
        QueryTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: QueryTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }
}
