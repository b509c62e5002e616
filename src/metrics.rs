//! Metric names and one-time descriptions.
//!
//! Recording goes through the `metrics` facade, so nothing is exported unless
//! a recorder is installed (`install_prometheus`, or a test-local recorder).

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const MATCHER_REQUESTS: &str = "matcher_requests_total";
pub const MATCHER_STAGE_FAILURES: &str = "matcher_stage_failures_total";
pub const TRENDS_ANALYZED: &str = "trends_analyzed_total";
pub const TRENDS_SKIPPED: &str = "trends_skipped_total";
pub const TREND_ANALYSIS_MS: &str = "trend_analysis_ms";
pub const LLM_CALLS: &str = "llm_calls_total";
pub const LLM_CACHE_HITS: &str = "llm_cache_hits_total";
pub const SINK_FAILURES: &str = "trend_sink_failures_total";
pub const POSTS_DROPPED: &str = "posts_dropped_total";

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            MATCHER_REQUESTS,
            "Keyword match requests, labelled by the stage that produced the result."
        );
        describe_counter!(
            MATCHER_STAGE_FAILURES,
            "Matcher stages that failed and escalated, labelled by stage and reason."
        );
        describe_counter!(TRENDS_ANALYZED, "Trends successfully analyzed.");
        describe_counter!(TRENDS_SKIPPED, "Trends skipped, labelled by reason.");
        describe_histogram!(TREND_ANALYSIS_MS, "Per-trend analysis time in milliseconds.");
        describe_counter!(LLM_CALLS, "LLM completion calls, labelled by status.");
        describe_counter!(LLM_CACHE_HITS, "LLM responses served from the file cache.");
        describe_counter!(SINK_FAILURES, "Analyzed trends the persistence sink rejected.");
        describe_counter!(
            POSTS_DROPPED,
            "Sample posts dropped before analysis, labelled by reason."
        );
    });
}

/// Install the Prometheus recorder globally and return its render handle.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    ensure_metrics_described();
    Ok(handle)
}
