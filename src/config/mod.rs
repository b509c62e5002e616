//! Analysis configuration.
//!
//! Load order: built-in defaults, then an optional TOML file, then env
//! overrides, then `validate()`. The resulting `AnalysisConfig` is read-only
//! for the lifetime of a run and is shared across concurrent trend analyses
//! behind an `Arc`.

pub mod ai;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tracing::warn;

use crate::analyze::preprocess::PreprocessOptions;
use crate::matcher::MatcherConfig;
use crate::scoring::PotentialWeights;
use crate::sentiment::FusionWeights;

pub const DEFAULT_ANALYSIS_CONFIG_PATH: &str = "config/analysis.toml";

pub const ENV_ANALYSIS_CONFIG_PATH: &str = "TREND_CONFIG_PATH";
pub const ENV_VELOCITY_THRESHOLD: &str = "TREND_VELOCITY_THRESHOLD";
pub const ENV_MIN_VOLUME: &str = "TREND_MIN_VOLUME";
pub const ENV_ADOPTER_THRESHOLD: &str = "TREND_ADOPTER_THRESHOLD";
pub const ENV_MAX_CONCURRENCY: &str = "TREND_MAX_CONCURRENCY";
pub const ENV_MAX_TRENDS: &str = "TREND_MAX_TRENDS";

/// Upper bound on per-run fanout, to stay friendly with upstream rate limits.
pub const MAX_CONCURRENCY_CAP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum posts/hour for the micro-trend gate.
    pub velocity_threshold: f64,
    /// Minimum platform volume for the micro-trend gate.
    pub min_tweet_volume: u64,
    /// Minimum early-adopter ratio for the micro-trend gate.
    pub early_adopter_threshold: f64,
    /// Last/first bucket activity ratio at which a trend counts as accelerating.
    pub acceleration_threshold: f64,
    /// Minimum potential score for the micro-trend gate.
    pub min_potential_score: f64,
    /// Look-back window for velocity and momentum, in hours.
    pub window_hours: f64,
    pub max_trends_to_analyze: usize,
    pub max_posts_per_trend: usize,
    /// Trends whose sample is smaller than this are skipped as `DataUnavailable`.
    pub min_sample_posts: usize,
    pub max_concurrency: usize,
    pub fetch_timeout_ms: u64,
    pub llm_timeout_ms: u64,
    /// Relevance floor used when discovering candidate trends.
    pub niche_relevance_threshold: f64,
    /// Normalized Levenshtein similarity at which two posts count as copies.
    pub dedup_similarity: f64,
    pub weights: PotentialWeights,
    pub sentiment: FusionWeights,
    pub preprocess: PreprocessOptions,
    pub matcher: MatcherConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: 2.0,
            min_tweet_volume: 50,
            early_adopter_threshold: 0.2,
            acceleration_threshold: 1.5,
            min_potential_score: 0.5,
            window_hours: 24.0,
            max_trends_to_analyze: 10,
            max_posts_per_trend: 100,
            min_sample_posts: 10,
            max_concurrency: 5,
            fetch_timeout_ms: 15_000,
            llm_timeout_ms: 20_000,
            niche_relevance_threshold: 0.3,
            dedup_similarity: 0.92,
            weights: PotentialWeights::default(),
            sentiment: FusionWeights::default(),
            preprocess: PreprocessOptions::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Resolve the config path from `TREND_CONFIG_PATH` (or the default path),
    /// load it if present and apply env overrides. A missing file is not an
    /// error; built-in defaults are used instead.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_ANALYSIS_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_ANALYSIS_CONFIG_PATH.to_string());
        let base = if Path::new(&path).exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides().validate())
    }

    /// Load from a TOML file (no env overrides).
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read analysis config at {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse analysis config at {}", path.display()))
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: AnalysisConfig = toml::from_str(toml_str)?;
        Ok(cfg.validate())
    }

    /// Apply `TREND_*` env overrides on top of the current values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = parse_f64_env(ENV_VELOCITY_THRESHOLD) {
            self.velocity_threshold = v;
        }
        if let Some(v) = parse_usize_env(ENV_MIN_VOLUME) {
            self.min_tweet_volume = v as u64;
        }
        if let Some(v) = parse_f64_env(ENV_ADOPTER_THRESHOLD) {
            self.early_adopter_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = parse_usize_env(ENV_MAX_CONCURRENCY) {
            self.max_concurrency = v;
        }
        if let Some(v) = parse_usize_env(ENV_MAX_TRENDS) {
            self.max_trends_to_analyze = v;
        }
        self
    }

    /// Range-check every field, replacing invalid values with defaults.
    pub fn validate(mut self) -> Self {
        let d = Self::default();

        fn non_neg_or(x: f64, fallback: f64) -> f64 {
            if x.is_finite() && x >= 0.0 {
                x
            } else {
                fallback
            }
        }

        self.velocity_threshold = non_neg_or(self.velocity_threshold, d.velocity_threshold);
        self.early_adopter_threshold =
            non_neg_or(self.early_adopter_threshold, d.early_adopter_threshold).min(1.0);
        self.acceleration_threshold =
            non_neg_or(self.acceleration_threshold, d.acceleration_threshold);
        self.min_potential_score =
            non_neg_or(self.min_potential_score, d.min_potential_score).min(1.0);
        self.niche_relevance_threshold =
            non_neg_or(self.niche_relevance_threshold, d.niche_relevance_threshold).min(1.0);
        self.dedup_similarity = non_neg_or(self.dedup_similarity, d.dedup_similarity).min(1.0);
        if !(self.window_hours.is_finite() && self.window_hours > 0.0) {
            self.window_hours = d.window_hours;
        }

        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY_CAP {
            warn!(
                requested = self.max_concurrency,
                "max_concurrency out of range, clamping to 1..={MAX_CONCURRENCY_CAP}"
            );
            self.max_concurrency = self.max_concurrency.clamp(1, MAX_CONCURRENCY_CAP);
        }
        if self.max_posts_per_trend == 0 {
            self.max_posts_per_trend = d.max_posts_per_trend;
        }
        if self.fetch_timeout_ms == 0 {
            self.fetch_timeout_ms = d.fetch_timeout_ms;
        }
        if self.llm_timeout_ms == 0 {
            self.llm_timeout_ms = d.llm_timeout_ms;
        }

        self.weights = self.weights.validated();
        self.sentiment = self.sentiment.validated();
        self.matcher = self.matcher.validated();
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }
}

fn parse_f64_env(name: &str) -> Option<f64> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_usize_env(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvSnapshot(Vec<(&'static str, Option<String>)>);

    impl EnvSnapshot {
        fn take(keys: &[&'static str]) -> Self {
            Self(keys.iter().map(|k| (*k, std::env::var(k).ok())).collect())
        }
    }

    impl Drop for EnvSnapshot {
        fn drop(&mut self) {
            for (k, v) in &self.0 {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let c = AnalysisConfig::default();
        assert_eq!(c.velocity_threshold, 2.0);
        assert_eq!(c.min_tweet_volume, 50);
        assert_eq!(c.early_adopter_threshold, 0.2);
        assert_eq!(c.acceleration_threshold, 1.5);
        assert_eq!(c.max_concurrency, 5);
    }

    #[test]
    fn toml_partial_override_keeps_other_defaults() {
        let cfg = AnalysisConfig::from_toml_str(
            r#"
min_tweet_volume = 500
max_concurrency = 64

[weights]
velocity = 0.5

[matcher]
max_matches = 3
"#,
        )
        .unwrap();
        assert_eq!(cfg.min_tweet_volume, 500);
        assert_eq!(cfg.max_concurrency, MAX_CONCURRENCY_CAP);
        assert_eq!(cfg.weights.velocity, 0.5);
        assert_eq!(cfg.weights.early_adopter, 0.25);
        assert_eq!(cfg.matcher.max_matches, 3);
        assert_eq!(cfg.velocity_threshold, 2.0);
    }

    #[test]
    fn validate_repairs_nonsense() {
        let cfg = AnalysisConfig {
            velocity_threshold: -1.0,
            window_hours: f64::NAN,
            max_concurrency: 0,
            ..AnalysisConfig::default()
        }
        .validate();
        assert_eq!(cfg.velocity_threshold, 2.0);
        assert_eq!(cfg.window_hours, 24.0);
        assert_eq!(cfg.max_concurrency, 1);
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        let _g = EnvSnapshot::take(&[ENV_MIN_VOLUME, ENV_VELOCITY_THRESHOLD, ENV_ADOPTER_THRESHOLD]);
        std::env::set_var(ENV_MIN_VOLUME, "1234");
        std::env::set_var(ENV_VELOCITY_THRESHOLD, "not-a-number");
        std::env::set_var(ENV_ADOPTER_THRESHOLD, "7");

        let cfg = AnalysisConfig::default().with_env_overrides().validate();
        assert_eq!(cfg.min_tweet_volume, 1234);
        assert_eq!(cfg.velocity_threshold, 2.0, "invalid env value is ignored");
        assert_eq!(cfg.early_adopter_threshold, 1.0);
    }

    #[test]
    fn load_reports_path_on_error() {
        let err = AnalysisConfig::load("/definitely/missing/analysis.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/missing/analysis.toml"));
    }
}
