// tests/metrics.rs
// The Prometheus recorder is process-global, so everything that needs it
// lives in this one test binary and runs serially.

use chrono::{Duration, TimeZone, Utc};
use serial_test::serial;
use std::sync::Arc;

use microtrend_engine::ingest::StaticPostSource;
use microtrend_engine::metrics::install_prometheus;
use microtrend_engine::models::{Post, TrendCandidate};
use microtrend_engine::{AnalysisConfig, MatcherConfig, TrendAnalysisOrchestrator, TrendKeywordMatcher};

fn posts(n: usize) -> Vec<Post> {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let topics = [
        "rust async runtimes", "borrow checker errors", "cargo workspaces",
        "embedded targets", "wasm bindings", "error handling crates",
        "serde derive macros", "tokio tracing setup", "proc macro hygiene",
        "const generics", "unsafe audits", "build times on CI",
    ];
    (0..n)
        .map(|i| {
            Post::new(
                format!("m{i}"),
                format!("Thinking about {} today", topics[i % topics.len()]),
                t0 + Duration::minutes(i as i64 * 7),
                format!("dev{i}"),
            )
        })
        .collect()
}

#[tokio::test]
#[serial]
async fn recorder_exposes_matcher_and_orchestrator_series() {
    let handle = match install_prometheus() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("recorder already installed in this process: {e}");
            return;
        }
    };

    let matcher = TrendKeywordMatcher::new(MatcherConfig::default(), None);
    let trends = vec![TrendCandidate::new("#AI", Some(100))];
    let out = matcher.match_trends(&trends, &["AI".to_string()], 5).await;
    assert_eq!(out.len(), 1);

    let src = StaticPostSource::new().with_sample("#Rust", posts(12));
    let orch = TrendAnalysisOrchestrator::new(AnalysisConfig::default(), Arc::new(src)).unwrap();
    let report = orch
        .run(
            &[],
            vec![TrendCandidate::new("#Rust", Some(80)), TrendCandidate::new("#Missing", None)],
        )
        .await;
    assert_eq!(report.trends.len(), 1);
    assert_eq!(report.skipped.len(), 1);

    let text = handle.render();
    for needle in [
        "matcher_requests_total",
        "matcher_stage_failures_total",
        "trends_analyzed_total",
        "trends_skipped_total",
        "trend_analysis_ms",
    ] {
        assert!(text.contains(needle), "missing {needle} in:\n{text}");
    }
    assert!(text.contains("reason=\"data_unavailable\""), "skip reason label missing:\n{text}");
}
