//! Value objects shared by the analysis pipeline and the matcher.
//!
//! Everything here is plain data: posts as fetched from a post source, the
//! records derived from them, and the final `AnalyzedTrend` / `TrendMatch`
//! outputs. Scores are range-checked once in the constructors so downstream
//! code can rely on `[0,1]` without re-validating.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Clamp to `[0,1]`, mapping NaN to 0.
#[inline]
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

// ------------------------------------------------------------
// Posts
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub retweets: u64,
    #[serde(default)]
    pub replies: u64,
    #[serde(default)]
    pub quotes: u64,
}

impl EngagementCounts {
    pub fn new(likes: u64, retweets: u64, replies: u64, quotes: u64) -> Self {
        Self {
            likes,
            retweets,
            replies,
            quotes,
        }
    }

    /// likes + retweets + replies + quotes, saturating.
    pub fn total(&self) -> u64 {
        self.likes
            .saturating_add(self.retweets)
            .saturating_add(self.replies)
            .saturating_add(self.quotes)
    }
}

/// Public profile data of a post author, when the source provides it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorMetadata {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub tweet_count: u64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// A single social media post. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub engagement: EngagementCounts,
    #[serde(default)]
    pub author: Option<AuthorMetadata>,
}

impl Post {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
        author_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at,
            author_id: author_id.into(),
            engagement: EngagementCounts::default(),
            author: None,
        }
    }

    pub fn with_engagement(mut self, engagement: EngagementCounts) -> Self {
        self.engagement = engagement;
        self
    }

    pub fn with_author(mut self, author: AuthorMetadata) -> Self {
        self.author = Some(author);
        self
    }
}

/// Parse a timestamp as RFC 3339 (any offset, converted to UTC) or as a naive
/// `YYYY-MM-DD[T ]HH:MM:SS[.f]` string, which is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {raw}")))
}

// ------------------------------------------------------------
// Text preprocessing output
// ------------------------------------------------------------

/// Per-post output of the text preprocessor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedPost {
    pub post_id: String,
    pub cleaned_text: String,
    pub keywords: Vec<String>,
    pub hashtags: Vec<String>,
    pub pain_points: Vec<String>,
    pub questions: Vec<String>,
}

/// Batch-level output of the text preprocessor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedText {
    pub all_keywords: Vec<String>,
    pub pain_points: Vec<String>,
    pub questions: Vec<String>,
    pub hashtags: Vec<String>,
    pub processed_texts: Vec<String>,
    pub processed_posts: Vec<ProcessedPost>,
}

// ------------------------------------------------------------
// Sentiment
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

/// The eight emotion categories, declared in lexicon order (used for tie-breaks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Joy,
    Anger,
    Fear,
    Sadness,
    Surprise,
    Disgust,
    Trust,
    Anticipation,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Joy,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Sadness,
        EmotionLabel::Surprise,
        EmotionLabel::Disgust,
        EmotionLabel::Trust,
        EmotionLabel::Anticipation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Trust => "trust",
            EmotionLabel::Anticipation => "anticipation",
        }
    }
}

/// Normalized positive/negative/neutral split of one text or a batch.
///
/// Invariants (held by every constructor): each component is in `[0,1]`,
/// the three sum to 1, `dominant_sentiment` is the arg-max and `confidence`
/// is the gap between the top two components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub dominant_sentiment: SentimentLabel,
    pub confidence: f64,
    pub dominant_emotion: Option<EmotionLabel>,
}

impl SentimentBreakdown {
    /// Fully neutral breakdown with zero confidence.
    pub fn neutral() -> Self {
        Self {
            positive: 0.0,
            negative: 0.0,
            neutral: 1.0,
            dominant_sentiment: SentimentLabel::Neutral,
            confidence: 0.0,
            dominant_emotion: None,
        }
    }

    /// Build from raw non-negative components. Negative or non-finite inputs
    /// count as 0; an all-zero triple falls back to `neutral()`.
    pub fn from_components(
        positive: f64,
        negative: f64,
        neutral: f64,
        dominant_emotion: Option<EmotionLabel>,
    ) -> Self {
        fn sanitize(x: f64) -> f64 {
            if x.is_finite() && x > 0.0 {
                x
            } else {
                0.0
            }
        }
        let (p, n, u) = (sanitize(positive), sanitize(negative), sanitize(neutral));
        let total = p + n + u;
        if total <= 0.0 {
            return Self {
                dominant_emotion,
                ..Self::neutral()
            };
        }
        let (p, n, u) = (p / total, n / total, u / total);

        // Ties resolve in declaration order: positive, negative, neutral.
        let ranked = [
            (SentimentLabel::Positive, p),
            (SentimentLabel::Negative, n),
            (SentimentLabel::Neutral, u),
        ];
        let mut top = ranked[0];
        for cand in &ranked[1..] {
            if cand.1 > top.1 {
                top = *cand;
            }
        }
        let mut scores = [p, n, u];
        scores.sort_by(|a, b| b.total_cmp(a));
        let confidence = clamp01(scores[0] - scores[1]);

        Self {
            positive: p,
            negative: n,
            neutral: u,
            dominant_sentiment: top.0,
            confidence,
            dominant_emotion,
        }
    }

    pub fn component(&self, label: SentimentLabel) -> f64 {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Negative => self.negative,
            SentimentLabel::Neutral => self.neutral,
        }
    }
}

impl Default for SentimentBreakdown {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Aggregate statistics over many breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub total_analyzed: usize,
    pub avg_positive: f64,
    pub avg_negative: f64,
    pub avg_neutral: f64,
    pub avg_confidence: f64,
    pub sentiment_distribution: HashMap<SentimentLabel, usize>,
    pub emotion_distribution: HashMap<EmotionLabel, usize>,
}

// ------------------------------------------------------------
// Velocity / metrics
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumDirection {
    Rising,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumSignal {
    pub momentum_score: f64,
    pub direction: MomentumDirection,
    /// Last bucket activity divided by first bucket activity (0 when undefined).
    pub acceleration: f64,
}

impl MomentumSignal {
    pub fn stable() -> Self {
        Self {
            momentum_score: 0.0,
            direction: MomentumDirection::Stable,
            acceleration: 0.0,
        }
    }
}

/// Per-run snapshot of the quantitative signals of one trend sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendMetrics {
    pub tweet_volume: u64,
    pub engagement_volume: u64,
    pub avg_engagement_rate: f64,
    pub unique_users: u64,
    pub time_span_hours: f64,
    pub velocity_score: f64,
}

impl TrendMetrics {
    /// Range-checked constructor: negative or non-finite rates become 0 and a
    /// non-positive span becomes 1 hour.
    pub fn new(
        tweet_volume: u64,
        engagement_volume: u64,
        avg_engagement_rate: f64,
        unique_users: u64,
        time_span_hours: f64,
        velocity_score: f64,
    ) -> Self {
        let non_neg = |x: f64| if x.is_finite() && x > 0.0 { x } else { 0.0 };
        let span = if time_span_hours.is_finite() && time_span_hours > 0.0 {
            time_span_hours
        } else {
            1.0
        };
        Self {
            tweet_volume,
            engagement_volume,
            avg_engagement_rate: non_neg(avg_engagement_rate),
            unique_users,
            time_span_hours: span,
            velocity_score: non_neg(velocity_score),
        }
    }
}

// ------------------------------------------------------------
// Trends
// ------------------------------------------------------------

/// Where a candidate trend came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendOrigin {
    #[default]
    Trending,
    KeywordSearch,
    Placeholder,
}

/// A trend name as listed by a trend source, optionally with its platform volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendCandidate {
    pub name: String,
    #[serde(default, alias = "volume")]
    pub tweet_volume: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    /// Pre-computed niche relevance, when the source already knows it.
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub origin: TrendOrigin,
}

impl TrendCandidate {
    pub fn new(name: impl Into<String>, tweet_volume: Option<u64>) -> Self {
        Self {
            name: name.into(),
            tweet_volume,
            url: None,
            relevance_score: None,
            origin: TrendOrigin::Trending,
        }
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(clamp01(score));
        self
    }

    pub fn with_origin(mut self, origin: TrendOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// High-engagement sample post kept for display next to an analyzed trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamplePost {
    pub post_id: String,
    pub text: String,
    pub engagement: u64,
    pub sentiment: SentimentLabel,
    pub created_at: DateTime<Utc>,
}

/// Primary output of one trend analysis. Read-only after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedTrend {
    pub trend_name: String,
    pub tweet_volume: Option<u64>,
    pub velocity_score: f64,
    pub momentum: MomentumSignal,
    /// Rising with last/first bucket activity at or above `acceleration_threshold`.
    pub is_accelerating: bool,
    pub sentiment_breakdown: SentimentBreakdown,
    pub niche_relevance_score: f64,
    pub trend_potential_score: f64,
    pub early_adopter_ratio: f64,
    pub is_micro_trend: bool,
    pub confidence_score: f64,
    pub metrics: TrendMetrics,
    pub keywords: Vec<String>,
    pub hashtags: Vec<String>,
    pub pain_points: Vec<String>,
    pub opportunities: Vec<String>,
    pub questions: Vec<String>,
    pub example_posts: Vec<ExamplePost>,
    pub origin: TrendOrigin,
    pub created_at: DateTime<Utc>,
}

/// One ranked keyword-to-trend match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendMatch {
    pub trend_name: String,
    pub trend_data: TrendCandidate,
    pub relevance_score: f64,
    pub matching_reasons: Vec<String>,
    pub semantic_keywords: Vec<String>,
}

impl TrendMatch {
    pub fn new(trend: &TrendCandidate, relevance_score: f64) -> Self {
        Self {
            trend_name: trend.name.clone(),
            trend_data: trend.clone(),
            relevance_score: clamp01(relevance_score),
            matching_reasons: Vec::new(),
            semantic_keywords: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_normalizes_and_ranks() {
        let b = SentimentBreakdown::from_components(2.0, 1.0, 1.0, None);
        assert!((b.positive + b.negative + b.neutral - 1.0).abs() < 1e-9);
        assert_eq!(b.dominant_sentiment, SentimentLabel::Positive);
        assert!((b.confidence - 0.25).abs() < 1e-9, "got {}", b.confidence);
    }

    #[test]
    fn breakdown_all_zero_is_neutral() {
        let b = SentimentBreakdown::from_components(0.0, f64::NAN, -3.0, None);
        assert_eq!(b, SentimentBreakdown::neutral());
    }

    #[test]
    fn breakdown_ties_pick_positive_first() {
        let b = SentimentBreakdown::from_components(0.5, 0.5, 0.0, None);
        assert_eq!(b.dominant_sentiment, SentimentLabel::Positive);
        assert_eq!(b.confidence, 0.0);
    }

    #[test]
    fn naive_and_aware_timestamps_meet_in_utc() {
        let naive = parse_timestamp("2024-05-01 12:00:00").unwrap();
        let aware = parse_timestamp("2024-05-01T14:00:00+02:00").unwrap();
        assert_eq!(naive, aware);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn post_deserializes_with_defaults() {
        let raw = r#"{"id":"1","text":"hello","created_at":"2024-05-01T10:00:00"}"#;
        let p: Post = serde_json::from_str(raw).unwrap();
        assert_eq!(p.engagement.total(), 0);
        assert!(p.author.is_none());
        assert_eq!(p.author_id, "");
    }

    #[test]
    fn metrics_constructor_guards_span() {
        let m = TrendMetrics::new(3, 0, f64::NAN, 1, 0.0, -1.0);
        assert_eq!(m.time_span_hours, 1.0);
        assert_eq!(m.avg_engagement_rate, 0.0);
        assert_eq!(m.velocity_score, 0.0);
    }
}
