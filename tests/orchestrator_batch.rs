// tests/orchestrator_batch.rs
// Batch analysis: per-trend failures are skipped, never fatal.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use microtrend_engine::analyze::{AdjacentTermExtractor, PreprocessOptions, TextAnalysisContext};
use microtrend_engine::ingest::{MemorySink, PostSource, StaticPostSource, StaticTrendSource, TrendSink};
use microtrend_engine::llm::LlmClient;
use microtrend_engine::models::{AnalyzedTrend, AuthorMetadata, EngagementCounts, Post, TrendCandidate, TrendOrigin};
use microtrend_engine::{AnalysisConfig, TrendAnalysisOrchestrator};

const TEXTS: &[&str] = &[
    "Our team switched to an AI agent for support tickets and it is amazing",
    "Why does every automation tool break when the API changes?",
    "Struggling to get the workflow builder to talk to our legacy CRM",
    "Just shipped a tiny bot that files expense reports for me",
    "Honestly the new model release feels overhyped, nothing changed",
    "How do you test prompts before they hit production?",
    "Frustrating that pricing for these assistants keeps changing monthly",
    "Love how fast the onboarding flow got after we automated it",
    "Anyone else seeing hallucinated invoice numbers from the extractor?",
    "Hiring our first ML engineer next week, wish us luck",
    "The open source agent framework finally supports retries",
    "I can't find good docs on running these models on-prem",
];

fn sample(prefix: &str, n: usize) -> Vec<Post> {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            Post::new(
                format!("{prefix}-{i}"),
                TEXTS[i % TEXTS.len()],
                t0 + ChronoDuration::minutes(i as i64 * 10),
                format!("author-{i}"),
            )
            .with_engagement(EngagementCounts::new(3 + i as u64, 1, 1, 0))
            .with_author(AuthorMetadata {
                followers_count: 2_000 + i as u64 * 100,
                following_count: 1_500,
                tweet_count: 900,
                description: Some("startup founder".into()),
                ..AuthorMetadata::default()
            })
        })
        .collect()
}

fn kws(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Post source with one scripted behaviour per query.
#[derive(Default)]
struct ScriptedSource {
    ok: HashMap<String, Vec<Post>>,
    fail: Vec<String>,
    hang: Vec<String>,
    panic: Vec<String>,
}

#[async_trait]
impl PostSource for ScriptedSource {
    async fn fetch_posts(&self, query: &str, sample_size: usize) -> anyhow::Result<Vec<Post>> {
        if self.fail.iter().any(|q| q == query) {
            anyhow::bail!("rate limited");
        }
        if self.hang.iter().any(|q| q == query) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.panic.iter().any(|q| q == query) {
            panic!("provider bug");
        }
        Ok(self
            .ok
            .get(query)
            .map(|p| p.iter().take(sample_size).cloned().collect())
            .unwrap_or_default())
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink that rejects everything.
struct RejectingSink;

#[async_trait]
impl TrendSink for RejectingSink {
    async fn save(&self, _trend: &AnalyzedTrend) -> anyhow::Result<String> {
        anyhow::bail!("database is read-only")
    }
}

/// Counts concurrent fetches and remembers the peak.
struct GaugedSource {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl PostSource for GaugedSource {
    async fn fetch_posts(&self, query: &str, _sample_size: usize) -> anyhow::Result<Vec<Post>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(sample(query, 12))
    }
    fn name(&self) -> &'static str {
        "gauged"
    }
}

struct ListLlm;

#[async_trait]
impl LlmClient for ListLlm {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        if prompt.contains("business opportunities") {
            Ok("1. Managed agent hosting for small teams\n2. Prompt regression testing service".into())
        } else {
            Ok("1. Automation tools break on API changes\n2. Unclear pricing for assistants".into())
        }
    }
    fn provider_name(&self) -> &'static str {
        "list"
    }
}

#[tokio::test(start_paused = true)]
async fn failures_are_skipped_and_order_is_kept() {
    let mut src = ScriptedSource::default();
    src.ok.insert("#Agents".into(), sample("a", 12));
    src.ok.insert("Workflow Bots".into(), sample("w", 12));
    src.ok.insert("#Thin".into(), sample("t", 3));
    src.fail.push("#RateLimited".into());
    src.hang.push("#Hanging".into());

    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(src)).unwrap();
    let candidates = vec![
        TrendCandidate::new("#Agents", Some(5_000)),
        TrendCandidate::new("#RateLimited", Some(100)),
        TrendCandidate::new("#Hanging", Some(100)),
        TrendCandidate::new("#Thin", Some(100)),
        TrendCandidate::new("Workflow Bots", Some(700)),
    ];
    let report = orch.run(&kws(&["ai", "automation"]), candidates).await;

    let names: Vec<_> = report.trends.iter().map(|t| t.trend_name.as_str()).collect();
    assert_eq!(names, vec!["#Agents", "Workflow Bots"]);

    let reasons: HashMap<_, _> = report
        .skipped
        .iter()
        .map(|s| (s.trend_name.as_str(), s.reason.as_str()))
        .collect();
    assert_eq!(reasons["#RateLimited"], "data_unavailable");
    assert_eq!(reasons["#Hanging"], "timeout");
    assert_eq!(reasons["#Thin"], "data_unavailable");

    for t in &report.trends {
        assert!((0.0..=1.0).contains(&t.trend_potential_score));
        assert!(t.confidence_score <= 0.9);
        assert!(t.example_posts.len() <= 5);
        assert_eq!(t.metrics.tweet_volume, 12);
        let b = &t.sentiment_breakdown;
        assert!((b.positive + b.negative + b.neutral - 1.0).abs() < 1e-6);
    }
    assert_eq!(report.sentiment.total_analyzed, 2);
}

#[tokio::test]
async fn empty_batch_is_not_an_error() {
    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(StaticPostSource::new())).unwrap();
    let report = orch.run(&kws(&["ai"]), Vec::new()).await;
    assert!(report.trends.is_empty());
    assert!(report.skipped.is_empty());

    let report = orch
        .run(&kws(&["ai"]), vec![TrendCandidate::new("#Unknown", Some(10))])
        .await;
    assert!(report.trends.is_empty());
    assert_eq!(report.skipped.len(), 1);
}

#[tokio::test]
async fn panicking_task_is_skipped() {
    let mut src = ScriptedSource::default();
    src.ok.insert("#Agents".into(), sample("a", 12));
    src.panic.push("#Boom".into());
    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(src)).unwrap();

    let report = orch
        .run(
            &[],
            vec![TrendCandidate::new("#Boom", None), TrendCandidate::new("#Agents", None)],
        )
        .await;
    assert_eq!(report.trends.len(), 1);
    assert_eq!(report.skipped[0].trend_name, "#Boom");
    assert_eq!(report.skipped[0].reason, "panicked");
}

#[tokio::test]
async fn sink_failures_are_reported_not_fatal() {
    let src = StaticPostSource::new().with_sample("#Agents", sample("a", 12));
    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(src))
        .unwrap()
        .with_sink(Arc::new(RejectingSink));
    let report = orch
        .run(&kws(&["ai"]), vec![TrendCandidate::new("#Agents", Some(900))])
        .await;
    assert_eq!(report.trends.len(), 1);
    assert!(report.saved_ids.is_empty());
    assert_eq!(report.save_failures.len(), 1);
    assert!(report.save_failures[0].error.contains("read-only"));
}

#[tokio::test]
async fn saved_ids_come_from_the_sink() {
    let src = StaticPostSource::new()
        .with_sample("#Agents", sample("a", 12))
        .with_sample("#Bots", sample("b", 12));
    let sink = Arc::new(MemorySink::new());
    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(src))
        .unwrap()
        .with_sink(sink.clone());
    let report = orch
        .run(
            &[],
            vec![TrendCandidate::new("#Agents", None), TrendCandidate::new("#Bots", None)],
        )
        .await;
    assert_eq!(report.saved_ids, vec!["trend-1", "trend-2"]);
    assert_eq!(sink.saved().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let src = Arc::new(GaugedSource {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let cfg = AnalysisConfig {
        max_concurrency: 2,
        ..AnalysisConfig::default()
    };
    let orch = TrendAnalysisOrchestrator::new(cfg, src.clone()).unwrap();
    let candidates: Vec<_> = (0..6)
        .map(|i| TrendCandidate::new(format!("#t{i}"), Some(100)))
        .collect();

    let (trends, skipped) = orch.analyze_candidates(&[], candidates).await;
    assert_eq!(trends.len(), 6);
    assert!(skipped.is_empty());
    assert!(src.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn max_trends_caps_the_batch() {
    let src = StaticPostSource::new().with_sample("#a", sample("a", 12));
    let cfg = AnalysisConfig {
        max_trends_to_analyze: 1,
        ..AnalysisConfig::default()
    };
    let orch = TrendAnalysisOrchestrator::new(cfg, Arc::new(src)).unwrap();
    let (trends, skipped) = orch
        .analyze_candidates(
            &[],
            vec![
                TrendCandidate::new("#a", None),
                TrendCandidate::new("#A", None),
                TrendCandidate::new("#b", None),
            ],
        )
        .await;
    assert_eq!(trends.len(), 1);
    assert!(skipped.is_empty());
}

#[tokio::test]
async fn llm_insights_are_merged() {
    let src = StaticPostSource::new().with_sample("#Agents", sample("a", 12));
    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(src))
        .unwrap()
        .with_llm(Arc::new(ListLlm));
    let report = orch
        .run(&kws(&["ai"]), vec![TrendCandidate::new("#Agents", Some(900))])
        .await;
    let t = &report.trends[0];
    assert_eq!(
        t.opportunities,
        vec!["Managed agent hosting for small teams", "Prompt regression testing service"]
    );
    assert!(t.pain_points.len() <= 15);
}

#[tokio::test]
async fn discovery_combines_trending_and_keyword_search() {
    let trends = StaticTrendSource::new(vec![
        TrendCandidate::new("#AI", Some(50_000)),
        TrendCandidate::new("#Cooking", Some(20_000)),
        TrendCandidate::new("Automation Tools", Some(900)),
        TrendCandidate::new("#ai", Some(10)),
    ]);
    let posts = StaticPostSource::new().with_sample("automation", sample("k", 7));
    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(posts)).unwrap();

    let found = orch
        .discover_candidates(&trends, "worldwide", &kws(&["ai", "automation"]))
        .await;
    let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["#AI", "Automation Tools", "automation"]);

    let niche = &found[2];
    assert_eq!(niche.origin, TrendOrigin::KeywordSearch);
    assert_eq!(niche.tweet_volume, Some(7));
    assert_eq!(niche.relevance_score, Some(0.8));
}

#[tokio::test]
async fn acceleration_follows_the_configured_threshold() {
    let run = |threshold: f64| async move {
        let src = StaticPostSource::new().with_sample("#Agents", sample("a", 12));
        let cfg = AnalysisConfig {
            acceleration_threshold: threshold,
            ..AnalysisConfig::default()
        };
        let orch = TrendAnalysisOrchestrator::new(cfg, Arc::new(src)).unwrap();
        let (trends, _) = orch
            .analyze_candidates(&[], vec![TrendCandidate::new("#Agents", None)])
            .await;
        trends.into_iter().next().unwrap()
    };

    // first bucket activity 21, last 48
    let t = run(1.5).await;
    assert!(t.momentum.acceleration > 2.0 && t.momentum.acceleration < 2.5);
    assert!(t.is_accelerating);
    assert!(!run(3.0).await.is_accelerating);
}

const BATTERY_TEXTS: &[&str] = &[
    "My phone battery life dropped after the update",
    "Is battery life on the new tablet any good?",
    "Swapped laptops mostly for battery life honestly",
    "Reviewers keep praising battery life but ignore the screen",
    "Camping trip tested the headlamp battery life nicely",
    "Smartwatch battery life barely survives a marathon",
    "Earbuds with two day battery life finally exist",
    "Cold weather wrecks scooter battery life every winter",
    "Firmware patch claims better battery life for routers",
    "Drone racing league cares about battery life above speed",
    "Kindle battery life remains absurdly long",
    "Gaming handheld battery life disappoints under load",
];

fn battery_sample() -> Vec<Post> {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    BATTERY_TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            Post::new(format!("b-{i}"), *text, t0 + ChronoDuration::minutes(i as i64 * 7), format!("author-{i}"))
                .with_engagement(EngagementCounts::new(4, 1, 0, 0))
        })
        .collect()
}

#[tokio::test]
async fn injected_text_context_adds_phrase_keywords() {
    let candidates = || vec![TrendCandidate::new("#Battery", Some(400))];

    let plain = TrendAnalysisOrchestrator::new(
        AnalysisConfig::default(),
        Arc::new(StaticPostSource::new().with_sample("#Battery", battery_sample())),
    )
    .unwrap();
    let (trends, _) = plain.analyze_candidates(&[], candidates()).await;
    assert!(!trends[0].keywords.iter().any(|k| k == "battery life"));

    let ctx = TextAnalysisContext::new(&PreprocessOptions::default())
        .unwrap()
        .with_phrase_extractor(Box::new(AdjacentTermExtractor));
    let enriched = TrendAnalysisOrchestrator::new(
        AnalysisConfig::default(),
        Arc::new(StaticPostSource::new().with_sample("#Battery", battery_sample())),
    )
    .unwrap()
    .with_text_context(ctx);
    let (trends, skipped) = enriched.analyze_candidates(&[], candidates()).await;
    assert!(skipped.is_empty());
    assert!(trends[0].keywords.iter().any(|k| k == "battery life"), "{:?}", trends[0].keywords);
}
