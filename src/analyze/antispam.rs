//! Near-duplicate post suppression.
//!
//! Retweet copies and bot floods inflate volume and skew sentiment, so a
//! sample is filtered before analysis: a post is dropped when its id was
//! already seen, or when its normalized text is at least
//! `similarity_threshold` similar (normalized Levenshtein) to a post kept
//! within the last `time_window`.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

use crate::models::Post;

#[derive(Clone, Debug)]
pub struct AntiSpamParams {
    /// Max number of remembered texts.
    pub window_size: usize,
    /// Similarity in [0.0, 1.0]; at or above it two texts are copies.
    pub similarity_threshold: f64,
    pub time_window: Duration,
}

impl Default for AntiSpamParams {
    fn default() -> Self {
        Self {
            window_size: 256,
            similarity_threshold: 0.92,
            time_window: Duration::hours(24),
        }
    }
}

#[derive(Clone, Debug)]
struct SeenItem {
    ts: DateTime<Utc>,
    text: String,
}

#[derive(Debug)]
pub struct AntiSpam {
    params: AntiSpamParams,
    window: VecDeque<SeenItem>,
    seen_ids: HashSet<String>,
}

impl AntiSpam {
    pub fn new(mut params: AntiSpamParams) -> Self {
        if params.window_size == 0 {
            params.window_size = 1;
        }
        params.similarity_threshold = if params.similarity_threshold.is_nan() {
            1.0
        } else {
            params.similarity_threshold.clamp(0.0, 1.0)
        };
        if params.time_window <= Duration::zero() {
            params.time_window = Duration::seconds(1);
        }
        let ws = params.window_size;
        Self {
            params,
            window: VecDeque::with_capacity(ws),
            seen_ids: HashSet::new(),
        }
    }

    pub fn params(&self) -> &AntiSpamParams {
        &self.params
    }

    /// Decide whether `post` duplicates something already kept.
    /// Accepted posts are remembered.
    pub fn should_block(&mut self, post: &Post) -> bool {
        if !post.id.is_empty() && !self.seen_ids.insert(post.id.clone()) {
            return true;
        }
        let norm = normalize(&post.text);
        if norm.is_empty() {
            return false;
        }
        let horizon = self.params.time_window;
        let threshold = self.params.similarity_threshold;
        let dup = self.window.iter().rev().any(|item| {
            (post.created_at - item.ts).abs() <= horizon
                && strsim::normalized_levenshtein(&norm, &item.text) >= threshold
        });
        if dup {
            return true;
        }
        if self.window.len() == self.params.window_size {
            self.window.pop_front();
        }
        self.window.push_back(SeenItem {
            ts: post.created_at,
            text: norm,
        });
        false
    }

    /// Keep only non-duplicate posts, in order. Input is not modified.
    pub fn filter_posts(&mut self, posts: &[Post]) -> Vec<Post> {
        posts
            .iter()
            .filter(|p| !self.should_block(p))
            .cloned()
            .collect()
    }
}

/// Lower-case, drop a leading `rt @user:` and collapse whitespace.
fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let body = match lower.strip_prefix("rt @") {
        Some(rest) => rest.split_once(':').map(|(_, b)| b).unwrap_or(rest),
        None => lower.as_str(),
    };
    body.split_whitespace().collect::<Vec<_>>().join(" ")
}
