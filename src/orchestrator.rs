//! Batch trend analysis.
//!
//! Each candidate is analyzed independently: fetch a sample, prepare it, run
//! preprocessing, sentiment, velocity, adopter and potential scoring, then
//! optionally ask the LLM for insights. Candidates run as tokio tasks behind a
//! semaphore. A failure (error, timeout or panic) in one task becomes a
//! `SkippedTrend` and never aborts the batch. Results keep candidate order.

use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::adopters::EarlyAdopterEstimator;
use crate::analyze::preprocess::{TextAnalysisContext, TextPreprocessor};
use crate::config::{AnalysisConfig, MAX_CONCURRENCY_CAP};
use crate::error::{TrendError, TrendResult};
use crate::ingest::{prepare_posts, PostSource, TrendSink, TrendSource};
use crate::insights::{InsightContext, InsightExtractor, Insights};
use crate::llm::DynLlmClient;
use crate::matcher::TrendKeywordMatcher;
use crate::metrics::{
    ensure_metrics_described, SINK_FAILURES, TRENDS_ANALYZED, TRENDS_SKIPPED, TREND_ANALYSIS_MS,
};
use crate::models::{
    AnalyzedTrend, ExamplePost, Post, SentimentBreakdown, SentimentLabel, SentimentSummary,
    TrendCandidate, TrendOrigin,
};
use crate::scoring::{passes_gate, GateInputs, PotentialInputs, PotentialScorer};
use crate::sentiment::{summarize, SentimentFuser};
use crate::velocity::VelocityEstimator;

pub const MAX_TOPIC_KEYWORDS: usize = 10;
pub const MAX_QUESTIONS: usize = 10;
pub const MAX_PAIN_POINTS: usize = 15;
pub const MAX_OPPORTUNITIES: usize = 10;
pub const MAX_EXAMPLES: usize = 5;
pub const MAX_EXAMPLES_PER_SENTIMENT: usize = 2;
pub const EXAMPLE_TEXT_CHARS: usize = 200;
pub const MAX_CONFIDENCE: f64 = 0.9;

pub const NICHE_SEARCH_KEYWORDS: usize = 5;
pub const NICHE_SEARCH_SAMPLE: usize = 50;
pub const NICHE_RELEVANCE: f64 = 0.8;
pub const OVERLAP_FLOOR: f64 = 0.1;

/// A candidate that produced no `AnalyzedTrend`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTrend {
    pub trend_name: String,
    /// Stable label, see `TrendError::kind`; `panicked` for crashed tasks.
    pub reason: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveFailure {
    pub trend_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Successfully analyzed trends, in candidate order.
    pub trends: Vec<AnalyzedTrend>,
    pub skipped: Vec<SkippedTrend>,
    pub saved_ids: Vec<String>,
    pub save_failures: Vec<SaveFailure>,
    /// Summary over the trends' aggregate sentiment.
    pub sentiment: SentimentSummary,
}

/// Everything a single analysis needs, shared read-only by all tasks.
struct Pipeline {
    config: AnalysisConfig,
    ctx: TextAnalysisContext,
    preprocessor: TextPreprocessor,
    fuser: SentimentFuser,
    velocity: VelocityEstimator,
    adopters: EarlyAdopterEstimator,
    scorer: PotentialScorer,
    relevance: TrendKeywordMatcher,
}

pub struct TrendAnalysisOrchestrator {
    pipeline: Arc<Pipeline>,
    posts: Arc<dyn PostSource>,
    sink: Option<Arc<dyn TrendSink>>,
    insights: Option<Arc<InsightExtractor>>,
    insight_ctx: Arc<InsightContext>,
}

impl TrendAnalysisOrchestrator {
    pub fn new(config: AnalysisConfig, posts: Arc<dyn PostSource>) -> TrendResult<Self> {
        let config = config.validate();
        let ctx = TextAnalysisContext::new(&config.preprocess)
            .map_err(|e| TrendError::Config(e.to_string()))?;
        let pipeline = Pipeline {
            ctx,
            preprocessor: TextPreprocessor::new(config.preprocess.clone()),
            fuser: SentimentFuser::new(config.sentiment),
            velocity: VelocityEstimator::new(config.acceleration_threshold),
            adopters: EarlyAdopterEstimator::new(),
            scorer: PotentialScorer::new(config.weights),
            relevance: TrendKeywordMatcher::new(config.matcher.clone(), None),
            config,
        };
        Ok(Self {
            pipeline: Arc::new(pipeline),
            posts,
            sink: None,
            insights: None,
            insight_ctx: Arc::new(InsightContext::default()),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn TrendSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Enable LLM insight extraction. A disabled client is ignored.
    pub fn with_llm(mut self, llm: DynLlmClient) -> Self {
        if llm.is_enabled() {
            let timeout = self.pipeline.config.llm_timeout();
            self.insights = Some(Arc::new(InsightExtractor::new(llm, timeout)));
        }
        self
    }

    /// Replace the preprocessing context, e.g. one with a phrase extractor.
    pub fn with_text_context(mut self, ctx: TextAnalysisContext) -> Self {
        match Arc::get_mut(&mut self.pipeline) {
            Some(pipeline) => pipeline.ctx = ctx,
            None => warn!("pipeline already shared, text context ignored"),
        }
        self
    }

    pub fn with_insight_context(mut self, ctx: InsightContext) -> Self {
        self.insight_ctx = Arc::new(ctx);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.pipeline.config
    }

    /// Analyze, then persist every result through the sink (if any).
    pub async fn run(&self, focus_keywords: &[String], candidates: Vec<TrendCandidate>) -> AnalysisReport {
        let (trends, skipped) = self.analyze_candidates(focus_keywords, candidates).await;
        let mut report = AnalysisReport {
            sentiment: summarize(
                &trends
                    .iter()
                    .map(|t| t.sentiment_breakdown)
                    .collect::<Vec<SentimentBreakdown>>(),
            ),
            trends,
            skipped,
            ..AnalysisReport::default()
        };

        if let Some(sink) = &self.sink {
            let timeout = self.pipeline.config.fetch_timeout();
            for trend in &report.trends {
                let failure = match tokio::time::timeout(timeout, sink.save(trend)).await {
                    Ok(Ok(id)) => {
                        report.saved_ids.push(id);
                        continue;
                    }
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => format!("save timed out after {timeout:?}"),
                };
                counter!(SINK_FAILURES).increment(1);
                warn!(target: "orchestrator", trend = %trend.trend_name, error = %failure, "saving trend failed");
                report.save_failures.push(SaveFailure {
                    trend_name: trend.trend_name.clone(),
                    error: failure,
                });
            }
        }

        info!(
            target: "orchestrator",
            analyzed = report.trends.len(),
            skipped = report.skipped.len(),
            saved = report.saved_ids.len(),
            "analysis run finished"
        );
        report
    }

    /// Discover candidates for a location and analyze them.
    pub async fn run_for_location(
        &self,
        trend_source: &dyn TrendSource,
        location: &str,
        focus_keywords: &[String],
    ) -> AnalysisReport {
        let candidates = self
            .discover_candidates(trend_source, location, focus_keywords)
            .await;
        self.run(focus_keywords, candidates).await
    }

    /// Analyze up to `max_trends_to_analyze` candidates with bounded
    /// concurrency. Returns analyzed trends in candidate order plus skips.
    pub async fn analyze_candidates(
        &self,
        focus_keywords: &[String],
        candidates: Vec<TrendCandidate>,
    ) -> (Vec<AnalyzedTrend>, Vec<SkippedTrend>) {
        ensure_metrics_described();
        let config = &self.pipeline.config;

        let mut seen = HashSet::new();
        let mut skipped_early = Vec::new();
        let mut queue = Vec::new();
        for c in candidates {
            let key = c.name.trim().to_lowercase();
            if key.is_empty() {
                skipped_early.push(skip_entry("", &TrendError::DataUnavailable { trend: String::new() }));
                continue;
            }
            if seen.insert(key) {
                queue.push(c);
            }
        }
        queue.truncate(config.max_trends_to_analyze);

        let keywords: Arc<Vec<String>> = Arc::new(focus_keywords.to_vec());
        let permits = Arc::new(Semaphore::new(config.max_concurrency.clamp(1, MAX_CONCURRENCY_CAP)));
        let mut set = JoinSet::new();
        let names: Vec<String> = queue.iter().map(|c| c.name.clone()).collect();

        for (idx, candidate) in queue.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let posts = Arc::clone(&self.posts);
            let insights = self.insights.clone();
            let insight_ctx = Arc::clone(&self.insight_ctx);
            let keywords = Arc::clone(&keywords);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (idx, Err(TrendError::Collaborator(anyhow::anyhow!("scheduler closed"))));
                };
                let started = Instant::now();
                let res = analyze_one(&pipeline, posts.as_ref(), insights.as_deref(), &insight_ctx, &keywords, candidate).await;
                histogram!(TREND_ANALYSIS_MS).record(started.elapsed().as_secs_f64() * 1000.0);
                (idx, res)
            });
        }

        let mut slots: Vec<Option<TrendResult<AnalyzedTrend>>> = (0..names.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, res)) => slots[idx] = Some(res),
                Err(e) => warn!(target: "orchestrator", error = %e, "analysis task failed to complete"),
            }
        }

        let mut trends = Vec::new();
        let mut skipped = skipped_early;
        for (name, slot) in names.iter().zip(slots) {
            match slot {
                Some(Ok(trend)) => {
                    counter!(TRENDS_ANALYZED).increment(1);
                    trends.push(trend);
                }
                Some(Err(e)) => {
                    counter!(TRENDS_SKIPPED, "reason" => e.kind()).increment(1);
                    warn!(target: "orchestrator", trend = %name, reason = e.kind(), error = %e, "trend skipped");
                    skipped.push(skip_entry(name, &e));
                }
                None => {
                    counter!(TRENDS_SKIPPED, "reason" => "panicked").increment(1);
                    skipped.push(SkippedTrend {
                        trend_name: name.clone(),
                        reason: "panicked".into(),
                        detail: "analysis task panicked".into(),
                    });
                }
            }
        }
        (trends, skipped)
    }

    /// Trending topics that overlap the focus keywords, plus one synthetic
    /// candidate per focus keyword that has recent posts. Deduplicated
    /// case-insensitively, most relevant first, capped at
    /// `max_trends_to_analyze`.
    pub async fn discover_candidates(
        &self,
        trend_source: &dyn TrendSource,
        location: &str,
        focus_keywords: &[String],
    ) -> Vec<TrendCandidate> {
        let config = &self.pipeline.config;
        let timeout = config.fetch_timeout();
        let mut seen = HashSet::new();
        let mut out: Vec<TrendCandidate> = Vec::new();

        let trending = match tokio::time::timeout(timeout, trend_source.list_trending(location)).await {
            Ok(Ok(list)) => list,
            Ok(Err(e)) => {
                warn!(target: "orchestrator", source = trend_source.name(), error = %e, "listing trends failed");
                Vec::new()
            }
            Err(_) => {
                warn!(target: "orchestrator", source = trend_source.name(), "listing trends timed out");
                Vec::new()
            }
        };

        for trend in trending {
            let key = trend.name.trim().to_lowercase();
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            let overlap = keyword_overlap(&trend.name, focus_keywords);
            let rule = self.pipeline.relevance.relevance_of(&trend.name, focus_keywords);
            if overlap > OVERLAP_FLOOR || rule > config.niche_relevance_threshold {
                seen.insert(key);
                out.push(trend.with_relevance(overlap.max(rule)).with_origin(TrendOrigin::Trending));
            }
        }

        for kw in focus_keywords.iter().take(NICHE_SEARCH_KEYWORDS) {
            let key = kw.trim().to_lowercase();
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            let found = match tokio::time::timeout(timeout, self.posts.fetch_posts(kw.trim(), NICHE_SEARCH_SAMPLE)).await {
                Ok(Ok(posts)) => posts.len(),
                Ok(Err(e)) => {
                    warn!(target: "orchestrator", keyword = %kw, error = %e, "keyword search failed");
                    0
                }
                Err(_) => {
                    warn!(target: "orchestrator", keyword = %kw, "keyword search timed out");
                    0
                }
            };
            if found > 0 {
                seen.insert(key);
                let mut c = TrendCandidate::new(kw.trim(), Some(found as u64))
                    .with_relevance(NICHE_RELEVANCE)
                    .with_origin(TrendOrigin::KeywordSearch);
                c.url = Some(format!("search?q={}", kw.trim().replace(' ', "+")));
                out.push(c);
            }
        }

        out.sort_by(|a, b| {
            b.relevance_score
                .unwrap_or(0.0)
                .total_cmp(&a.relevance_score.unwrap_or(0.0))
        });
        out.truncate(config.max_trends_to_analyze);
        debug!(target: "orchestrator", candidates = out.len(), "candidates discovered");
        out
    }
}

fn skip_entry(name: &str, e: &TrendError) -> SkippedTrend {
    SkippedTrend {
        trend_name: name.to_string(),
        reason: e.kind().to_string(),
        detail: e.to_string(),
    }
}

async fn analyze_one(
    pipeline: &Pipeline,
    source: &dyn PostSource,
    insights: Option<&InsightExtractor>,
    insight_ctx: &InsightContext,
    keywords: &[String],
    candidate: TrendCandidate,
) -> TrendResult<AnalyzedTrend> {
    let config = &pipeline.config;
    let name = candidate.name.clone();
    let timeout = config.fetch_timeout();

    let raw = match tokio::time::timeout(timeout, source.fetch_posts(&name, config.max_posts_per_trend)).await {
        Err(_) => {
            return Err(TrendError::CollaboratorTimeout {
                operation: "fetch_posts",
                trend: name,
                timeout,
            })
        }
        Ok(Err(e)) => {
            warn!(target: "orchestrator", trend = %name, source = source.name(), error = %e, "post fetch failed");
            return Err(TrendError::DataUnavailable { trend: name });
        }
        Ok(Ok(posts)) => posts,
    };

    let sample = prepare_posts(&raw, config.max_posts_per_trend, config.dedup_similarity);
    if sample.posts.is_empty() || sample.posts.len() < config.min_sample_posts {
        debug!(target: "orchestrator", trend = %name, posts = sample.posts.len(), "sample too small");
        return Err(TrendError::DataUnavailable { trend: name });
    }

    let extra = match insights {
        Some(ex) => {
            let texts: Vec<String> = sample.posts.iter().map(|p| p.text.clone()).collect();
            ex.extract(&name, &texts, insight_ctx).await
        }
        None => Insights::default(),
    };

    Ok(pipeline.assemble(&candidate, &sample.posts, keywords, extra))
}

impl Pipeline {
    /// Pure scoring of a prepared sample.
    fn assemble(
        &self,
        candidate: &TrendCandidate,
        posts: &[Post],
        keywords: &[String],
        extra: Insights,
    ) -> AnalyzedTrend {
        let config = &self.config;
        let text = self.preprocessor.process(&self.ctx, posts);
        let texts: Vec<&str> = posts.iter().map(|p| p.text.as_str()).collect();
        let (overall, per_post) = self.fuser.analyze_batch(&texts);

        let metrics = self.velocity.trend_metrics(posts, config.window_hours);
        let momentum = self.velocity.momentum(posts, config.window_hours);
        let adopter_ratio = self.adopters.ratio(posts);
        let relevance = candidate
            .relevance_score
            .unwrap_or_else(|| self.relevance.relevance_of(&candidate.name, keywords));

        let potential = self.scorer.score(&PotentialInputs::new(
            metrics.velocity_score,
            adopter_ratio,
            metrics.avg_engagement_rate,
            relevance,
        ));
        let is_micro_trend = passes_gate(
            &GateInputs {
                tweet_volume: candidate.tweet_volume,
                velocity: Some(metrics.velocity_score),
                adopter_ratio: Some(adopter_ratio),
                potential: Some(potential),
            },
            config,
        );

        let pain_points = merge_unique(text.pain_points.iter().chain(&extra.pain_points), MAX_PAIN_POINTS);
        let opportunities = merge_unique(extra.opportunities.iter(), MAX_OPPORTUNITIES);

        AnalyzedTrend {
            trend_name: candidate.name.clone(),
            tweet_volume: candidate.tweet_volume,
            velocity_score: metrics.velocity_score,
            momentum,
            is_accelerating: self.velocity.is_accelerating(&momentum),
            sentiment_breakdown: overall,
            niche_relevance_score: relevance,
            trend_potential_score: potential,
            early_adopter_ratio: adopter_ratio,
            is_micro_trend,
            confidence_score: overall.confidence.min(MAX_CONFIDENCE),
            metrics,
            keywords: text.all_keywords.iter().take(MAX_TOPIC_KEYWORDS).cloned().collect(),
            hashtags: text.hashtags.clone(),
            pain_points,
            opportunities,
            questions: text.questions.iter().take(MAX_QUESTIONS).cloned().collect(),
            example_posts: select_example_posts(posts, &per_post),
            origin: candidate.origin,
            created_at: chrono::Utc::now(),
        }
    }
}

fn merge_unique<'a>(items: impl Iterator<Item = &'a String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(cap)
        .cloned()
        .collect()
}

/// Highest-engagement posts, at most two per dominant sentiment and five in
/// total.
pub fn select_example_posts(posts: &[Post], sentiments: &[SentimentBreakdown]) -> Vec<ExamplePost> {
    let mut pairs: Vec<(&Post, &SentimentBreakdown)> = posts.iter().zip(sentiments).collect();
    pairs.sort_by(|a, b| b.0.engagement.total().cmp(&a.0.engagement.total()));

    let mut per_label = [0usize; 3];
    let mut out = Vec::new();
    for (post, sentiment) in pairs {
        let slot = match sentiment.dominant_sentiment {
            SentimentLabel::Positive => 0,
            SentimentLabel::Negative => 1,
            SentimentLabel::Neutral => 2,
        };
        if per_label[slot] >= MAX_EXAMPLES_PER_SENTIMENT {
            continue;
        }
        per_label[slot] += 1;
        out.push(ExamplePost {
            post_id: post.id.clone(),
            text: post.text.chars().take(EXAMPLE_TEXT_CHARS).collect(),
            engagement: post.engagement.total(),
            sentiment: sentiment.dominant_sentiment,
            created_at: post.created_at,
        });
        if out.len() >= MAX_EXAMPLES {
            break;
        }
    }
    out
}

/// Jaccard overlap between the words of a trend name and of the keywords.
/// A leading `#` is ignored.
pub fn keyword_overlap(trend_name: &str, keywords: &[String]) -> f64 {
    let words = |s: &str| -> HashSet<String> {
        s.split_whitespace()
            .map(|w| w.trim_start_matches('#').to_lowercase())
            .filter(|w| !w.is_empty())
            .collect()
    };
    let trend = words(trend_name);
    let kws = words(&keywords.join(" "));
    let union = trend.union(&kws).count();
    if union == 0 {
        return 0.0;
    }
    trend.intersection(&kws).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::StaticPostSource;
    use crate::models::EngagementCounts;
    use chrono::{Duration, TimeZone, Utc};

    fn post(i: usize, text: &str, likes: u64) -> Post {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        Post::new(format!("p{i}"), text, t0 + Duration::minutes(i as i64 * 5), format!("u{i}"))
            .with_engagement(EngagementCounts::new(likes, 0, 0, 0))
    }

    #[test]
    fn overlap_is_jaccard_over_words() {
        let kws = vec!["ai tools".to_string(), "automation".to_string()];
        assert!((keyword_overlap("#AI", &kws) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(keyword_overlap("#Cooking", &kws), 0.0);
        assert_eq!(keyword_overlap("", &[]), 0.0);
    }

    #[test]
    fn examples_respect_per_sentiment_and_total_caps() {
        let posts: Vec<Post> = (0..8).map(|i| post(i, &"x".repeat(300), i as u64)).collect();
        let labels = [
            SentimentBreakdown::from_components(1.0, 0.0, 0.0, None),
            SentimentBreakdown::from_components(0.0, 1.0, 0.0, None),
            SentimentBreakdown::from_components(0.0, 0.0, 1.0, None),
        ];
        let sentiments: Vec<SentimentBreakdown> = (0..8).map(|i| labels[i % 3]).collect();
        let ex = select_example_posts(&posts, &sentiments);
        assert_eq!(ex.len(), MAX_EXAMPLES);
        assert_eq!(ex[0].post_id, "p7");
        assert!(ex.iter().all(|e| e.text.chars().count() == EXAMPLE_TEXT_CHARS));
        for label in [SentimentLabel::Positive, SentimentLabel::Negative, SentimentLabel::Neutral] {
            assert!(ex.iter().filter(|e| e.sentiment == label).count() <= MAX_EXAMPLES_PER_SENTIMENT);
        }
    }

    #[test]
    fn merge_dedupes_case_insensitively() {
        let a = vec!["Slow builds".to_string(), "slow builds".to_string(), "Flaky tests".to_string()];
        assert_eq!(merge_unique(a.iter(), 15), vec!["Slow builds", "Flaky tests"]);
        assert_eq!(merge_unique(a.iter(), 1).len(), 1);
    }

    #[tokio::test]
    async fn small_samples_are_skipped() {
        let src = StaticPostSource::new().with_sample("#tiny", vec![post(0, "just one post here", 1)]);
        let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(src)).unwrap();
        let (trends, skipped) = orch
            .analyze_candidates(&[], vec![TrendCandidate::new("#tiny", Some(100))])
            .await;
        assert!(trends.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, "data_unavailable");
    }
}
