// src/ingest/mod.rs
//! Collaborator seams: where posts and trend names come from and where
//! analyzed trends go. Only these calls may block; the engine wraps each one
//! in a timeout.

pub mod memory;

use async_trait::async_trait;
use metrics::counter;
use tracing::debug;

use crate::analyze::antispam::{AntiSpam, AntiSpamParams};
use crate::metrics::{ensure_metrics_described, POSTS_DROPPED};
use crate::models::{AnalyzedTrend, Post, TrendCandidate};

pub use memory::{MemorySink, StaticPostSource, StaticTrendSource};

/// Post samples for a query (a trend name or a search string).
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts(&self, query: &str, sample_size: usize) -> anyhow::Result<Vec<Post>>;
    fn name(&self) -> &'static str;
}

/// Currently trending topic names for a location.
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn list_trending(&self, location: &str) -> anyhow::Result<Vec<TrendCandidate>>;
    fn name(&self) -> &'static str;
}

/// Persistence for finished analyses. Returns the stored id.
#[async_trait]
pub trait TrendSink: Send + Sync {
    async fn save(&self, trend: &AnalyzedTrend) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedSample {
    pub posts: Vec<Post>,
    pub dropped_empty: usize,
    pub dropped_duplicates: usize,
}

/// Drop blank posts and near-duplicates, then cap the sample. The input is
/// left untouched.
pub fn prepare_posts(raw: &[Post], max_posts: usize, dedup_similarity: f64) -> PreparedSample {
    ensure_metrics_described();

    let non_empty: Vec<Post> = raw
        .iter()
        .filter(|p| !p.text.trim().is_empty())
        .cloned()
        .collect();
    let dropped_empty = raw.len() - non_empty.len();

    let mut spam = AntiSpam::new(AntiSpamParams {
        similarity_threshold: dedup_similarity,
        ..AntiSpamParams::default()
    });
    let mut posts = spam.filter_posts(&non_empty);
    let dropped_duplicates = non_empty.len() - posts.len();
    posts.truncate(max_posts);

    if dropped_empty > 0 {
        counter!(POSTS_DROPPED, "reason" => "empty").increment(dropped_empty as u64);
    }
    if dropped_duplicates > 0 {
        counter!(POSTS_DROPPED, "reason" => "duplicate").increment(dropped_duplicates as u64);
    }
    debug!(
        kept = posts.len(),
        dropped_empty, dropped_duplicates, "sample prepared"
    );

    PreparedSample {
        posts,
        dropped_empty,
        dropped_duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn mk(id: &str, text: &str, min: i64) -> Post {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Post::new(id, text, t0 + Duration::minutes(min), format!("u{id}"))
    }

    #[test]
    fn prepare_drops_blank_and_copies_then_caps() {
        let raw = vec![
            mk("1", "agents are taking over my calendar", 0),
            mk("2", "   ", 1),
            mk("3", "RT @bob: agents are taking over my calendar", 2),
            mk("4", "switched our CRM to a no-code tool", 3),
            mk("5", "pricing for LLM APIs keeps dropping", 4),
            mk("6", "vector databases are the new hotness", 5),
        ];
        let out = prepare_posts(&raw, 2, 0.92);
        assert_eq!(out.dropped_empty, 1);
        assert_eq!(out.dropped_duplicates, 1);
        let ids: Vec<_> = out.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
        assert_eq!(raw.len(), 6);
    }

    #[test]
    fn prepare_empty_input() {
        assert_eq!(prepare_posts(&[], 10, 0.9), PreparedSample::default());
    }
}
