//! Offline demo: match a few synthetic trends against focus keywords, then run
//! a full analysis over generated post samples and print the report as JSON.
//!
//! Env:
//!   TREND_DEMO_JSON_LOGS=1   JSON log lines instead of compact ones
//!   TREND_DEMO_METRICS=1     install the Prometheus recorder and dump it at the end
//!   TREND_CONFIG_PATH        analysis TOML (defaults apply when missing)

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use microtrend_engine::config::ai::LlmConfig;
use microtrend_engine::ingest::{MemorySink, StaticPostSource, StaticTrendSource};
use microtrend_engine::logging::init_tracing;
use microtrend_engine::metrics::install_prometheus;
use microtrend_engine::{
    build_client_from_config, detect_micro_trends, AnalysisConfig, AuthorMetadata,
    EngagementCounts, Post, TrendAnalysisOrchestrator, TrendCandidate, TrendKeywordMatcher,
};

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

/// `n` posts spread over `hours`, engagement growing towards the end.
fn synthetic_sample(topic: &str, n: usize, hours: i64, texts: &[&str]) -> Vec<Post> {
    let start = Utc::now() - Duration::hours(hours);
    let step = Duration::minutes(hours * 60 / n.max(1) as i64);
    (0..n)
        .map(|i| {
            let text = format!("{} {}", texts[i % texts.len()], topic);
            Post::new(format!("{topic}-{i}"), text, start + step * i as i32, format!("user{i}"))
                .with_engagement(EngagementCounts::new(2 + i as u64 * 3, i as u64, 1, 0))
                .with_author(AuthorMetadata {
                    username: Some(format!("user{i}")),
                    followers_count: 800 + i as u64 * 450,
                    following_count: 600,
                    tweet_count: 300 + i as u64 * 40,
                    verified: false,
                    description: (i % 3 == 0).then(|| "indie hacker, startup founder".to_string()),
                })
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing(flag("TREND_DEMO_JSON_LOGS"));

    let prom = if flag("TREND_DEMO_METRICS") {
        Some(install_prometheus()?)
    } else {
        None
    };

    let config = AnalysisConfig::from_env()?;
    let llm_config = match LlmConfig::load_or_default() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "LLM config unusable, continuing without LLM");
            LlmConfig::default()
        }
    };
    let llm = build_client_from_config(&llm_config);
    info!(provider = llm.provider_name(), enabled = llm.is_enabled(), "LLM client ready");

    let keywords: Vec<String> = ["AI", "automation", "no-code"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let trending = vec![
        TrendCandidate::new("#AI", Some(50_000)),
        TrendCandidate::new("Workflow Automation", Some(1_200)),
        TrendCandidate::new("#Cooking", Some(20_000)),
        TrendCandidate::new("No-Code Tools", Some(900)),
    ];

    let matcher = TrendKeywordMatcher::new(config.matcher.clone(), Some(llm.clone()));
    let outcome = matcher
        .match_detailed(&trending, &keywords, config.matcher.max_matches)
        .await;
    println!("== keyword matches ({:?}) ==", outcome.stage);
    println!("{}", serde_json::to_string_pretty(&outcome.matches)?);

    let agent_texts = [
        "Our new AI agent just automated the weekly report, amazing",
        "Why is it so hard to connect automation tools to legacy systems?",
        "Struggling with flaky workflow runs again, frustrating",
        "Tried a no-code builder for onboarding flows, pretty good",
    ];
    let posts = StaticPostSource::new()
        .with_sample("#AI", synthetic_sample("#AI", 40, 6, &agent_texts))
        .with_sample("Workflow Automation", synthetic_sample("workflow", 24, 12, &agent_texts))
        .with_sample("No-Code Tools", synthetic_sample("nocode", 5, 2, &agent_texts))
        .with_sample("no-code", synthetic_sample("nocode", 12, 3, &agent_texts));
    let sink = Arc::new(MemorySink::new());

    let orchestrator = TrendAnalysisOrchestrator::new(config.clone(), Arc::new(posts))?
        .with_sink(sink.clone())
        .with_llm(llm);

    let source = StaticTrendSource::new(trending);
    let report = orchestrator
        .run_for_location(&source, "worldwide", &keywords)
        .await;

    println!("== analysis report ==");
    println!("{}", serde_json::to_string_pretty(&report)?);

    let micro = detect_micro_trends(&report.trends, &config);
    println!(
        "== {} micro-trend(s): {:?} ==",
        micro.len(),
        micro.iter().map(|t| t.trend_name.as_str()).collect::<Vec<_>>()
    );

    if let Some(handle) = prom {
        println!("== metrics ==\n{}", handle.render());
    }
    Ok(())
}
