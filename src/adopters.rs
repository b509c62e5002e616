//! Early-adopter share of a sample's author population.
//!
//! Each distinct author gets a 0..=5 score from independent profile signals;
//! a score of 2 or more marks an early adopter. Authors without any profile
//! metadata are left out of the denominator.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{AuthorMetadata, Post};

/// Follower band that is neither mainstream nor tiny (inclusive).
pub const FOLLOWER_BAND: (u64, u64) = (1_000, 50_000);
pub const FOLLOWING_RATIO_MIN: f64 = 0.5;
pub const ACTIVE_TWEET_COUNT: u64 = 500;
pub const VERIFIED_FOLLOWER_CAP: u64 = 100_000;
pub const EARLY_ADOPTER_MIN_SCORE: u8 = 2;

const INNOVATION_KEYWORDS: &[&str] = &[
    "entrepreneur",
    "startup",
    "founder",
    "innovation",
    "tech",
    "developer",
    "designer",
    "product",
    "early adopter",
    "beta",
    "maker",
    "indie hacker",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdopterBreakdown {
    pub ratio: f64,
    pub early_adopters: usize,
    /// Distinct authors with metadata (the denominator).
    pub scored_authors: usize,
    /// Distinct authors seen without metadata.
    pub unresolved_authors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EarlyAdopterEstimator;

impl EarlyAdopterEstimator {
    pub fn new() -> Self {
        Self
    }

    /// 0..=5 signal count for one profile.
    pub fn author_score(&self, author: &AuthorMetadata) -> u8 {
        let followers = author.followers_count;
        let mut score = 0u8;

        if (FOLLOWER_BAND.0..=FOLLOWER_BAND.1).contains(&followers) {
            score += 1;
        }
        if followers > 0
            && author.following_count as f64 / followers as f64 > FOLLOWING_RATIO_MIN
        {
            score += 1;
        }
        if author.tweet_count > ACTIVE_TWEET_COUNT {
            score += 1;
        }
        if author.verified && followers < VERIFIED_FOLLOWER_CAP {
            score += 1;
        }
        if let Some(bio) = author.description.as_deref() {
            let bio = bio.to_lowercase();
            if INNOVATION_KEYWORDS.iter().any(|k| bio.contains(k)) {
                score += 1;
            }
        }
        score
    }

    pub fn is_early_adopter(&self, author: &AuthorMetadata) -> bool {
        self.author_score(author) >= EARLY_ADOPTER_MIN_SCORE
    }

    /// Early-adopter ratio in [0,1]; 0 when no author has metadata.
    pub fn ratio(&self, posts: &[Post]) -> f64 {
        self.breakdown(posts).ratio
    }

    /// Ratio plus the counts behind it. An author's metadata is taken from
    /// the first of their posts that carries any.
    pub fn breakdown(&self, posts: &[Post]) -> AdopterBreakdown {
        let mut order: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut profiles: HashMap<&str, &AuthorMetadata> = HashMap::new();

        for post in posts.iter().filter(|p| !p.author_id.is_empty()) {
            let id = post.author_id.as_str();
            if seen.insert(id) {
                order.push(id);
            }
            if let Some(meta) = post.author.as_ref() {
                profiles.entry(id).or_insert(meta);
            }
        }

        let mut out = AdopterBreakdown::default();
        for id in order {
            match profiles.get(id) {
                Some(meta) => {
                    out.scored_authors += 1;
                    if self.is_early_adopter(meta) {
                        out.early_adopters += 1;
                    }
                }
                None => out.unresolved_authors += 1,
            }
        }
        if out.scored_authors > 0 {
            out.ratio = out.early_adopters as f64 / out.scored_authors as f64;
        }
        out
    }
}
