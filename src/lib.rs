// src/lib.rs
// Public library surface for the demo binary and integration tests.

pub mod adopters;
pub mod analyze;
pub mod config;
pub mod error;
pub mod ingest;
pub mod insights;
pub mod llm;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod scoring;
pub mod sentiment;
pub mod velocity;

// ---- Re-exports for stable public API ----
pub use crate::adopters::EarlyAdopterEstimator;
pub use crate::analyze::{TextAnalysisContext, TextPreprocessor};
pub use crate::config::ai::LlmConfig;
pub use crate::config::AnalysisConfig;
pub use crate::error::{TrendError, TrendResult};
pub use crate::ingest::{PostSource, TrendSink, TrendSource};
pub use crate::llm::{build_client_from_config, DynLlmClient, LlmClient};
pub use crate::matcher::{MatchOutcome, MatchStage, MatcherConfig, TrendKeywordMatcher};
pub use crate::models::{
    AnalyzedTrend, AuthorMetadata, EngagementCounts, MomentumDirection, Post, SentimentBreakdown,
    SentimentLabel, TrendCandidate, TrendMatch, TrendMetrics,
};
pub use crate::orchestrator::{AnalysisReport, SkippedTrend, TrendAnalysisOrchestrator};
pub use crate::scoring::{detect_micro_trends, is_micro_trend, PotentialScorer};
pub use crate::sentiment::SentimentFuser;
pub use crate::velocity::VelocityEstimator;
