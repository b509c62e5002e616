//! In-memory collaborators for tests, demos and offline replays.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{PostSource, TrendSink, TrendSource};
use crate::models::{AnalyzedTrend, Post, TrendCandidate};

/// Posts keyed by query, matched case-insensitively. Unknown queries return
/// an empty sample.
#[derive(Debug, Clone, Default)]
pub struct StaticPostSource {
    samples: HashMap<String, Vec<Post>>,
}

impl StaticPostSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample(mut self, query: &str, posts: Vec<Post>) -> Self {
        self.samples.insert(query.trim().to_lowercase(), posts);
        self
    }

    /// Load `{ "query": [Post, ...], ... }`.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, Vec<Post>> = serde_json::from_str(json)?;
        Ok(raw
            .into_iter()
            .fold(Self::new(), |src, (q, posts)| src.with_sample(&q, posts)))
    }
}

#[async_trait]
impl PostSource for StaticPostSource {
    async fn fetch_posts(&self, query: &str, sample_size: usize) -> anyhow::Result<Vec<Post>> {
        Ok(self
            .samples
            .get(&query.trim().to_lowercase())
            .map(|posts| posts.iter().take(sample_size).cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Trending lists keyed by location; the empty key is the fallback.
#[derive(Debug, Clone, Default)]
pub struct StaticTrendSource {
    by_location: HashMap<String, Vec<TrendCandidate>>,
}

impl StaticTrendSource {
    pub fn new(trends: Vec<TrendCandidate>) -> Self {
        let mut by_location = HashMap::new();
        by_location.insert(String::new(), trends);
        Self { by_location }
    }

    pub fn with_location(mut self, location: &str, trends: Vec<TrendCandidate>) -> Self {
        self.by_location.insert(location.to_lowercase(), trends);
        self
    }
}

#[async_trait]
impl TrendSource for StaticTrendSource {
    async fn list_trending(&self, location: &str) -> anyhow::Result<Vec<TrendCandidate>> {
        let list = self
            .by_location
            .get(&location.to_lowercase())
            .or_else(|| self.by_location.get(""))
            .cloned()
            .unwrap_or_default();
        Ok(list)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Keeps saved trends in memory, ids are `trend-<n>`.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<AnalyzedTrend>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<AnalyzedTrend> {
        self.saved.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TrendSink for MemorySink {
    async fn save(&self, trend: &AnalyzedTrend) -> anyhow::Result<String> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?;
        saved.push(trend.clone());
        Ok(format!("trend-{}", saved.len()))
    }
}
