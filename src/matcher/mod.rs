//! Trend <-> keyword matching with staged fallback.
//!
//! Stages run strictly in order: LLM, then dictionary rules, then plain
//! substring hits. Each stage is a function to `StageResult`; `escalate`
//! returns the first success and records every failure on the way. The
//! substring stage never fails, so a request always yields a (possibly
//! empty) list.

pub mod dictionary;
pub mod llm;
pub mod rules;

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::DynLlmClient;
use crate::metrics::{ensure_metrics_described, MATCHER_REQUESTS, MATCHER_STAGE_FAILURES};
use crate::models::{clamp01, TrendCandidate, TrendMatch};
pub use dictionary::SemanticDictionary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub max_matches: usize,
    /// Scores must be strictly above this to count (LLM and rule stages).
    pub min_relevance: f64,
    /// Volume given to placeholder trends the LLM invents.
    pub placeholder_volume: u64,
    pub llm_timeout_ms: u64,
    /// Replaces the built-in dictionary when present.
    pub dictionary: Option<HashMap<String, Vec<String>>>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_matches: 10,
            min_relevance: 0.3,
            placeholder_volume: 10_000,
            llm_timeout_ms: 20_000,
            dictionary: None,
        }
    }
}

impl MatcherConfig {
    pub fn validated(self) -> Self {
        let d = Self::default();
        Self {
            max_matches: if self.max_matches == 0 { d.max_matches } else { self.max_matches },
            min_relevance: if self.min_relevance.is_finite() {
                clamp01(self.min_relevance)
            } else {
                d.min_relevance
            },
            llm_timeout_ms: if self.llm_timeout_ms == 0 { d.llm_timeout_ms } else { self.llm_timeout_ms },
            ..self
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn build_dictionary(&self) -> SemanticDictionary {
        match &self.dictionary {
            Some(map) => SemanticDictionary::from_map(map),
            None => SemanticDictionary::default_seed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Llm,
    RuleBased,
    Substring,
}

impl MatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStage::Llm => "llm",
            MatchStage::RuleBased => "rule_based",
            MatchStage::Substring => "substring",
        }
    }
}

/// Why a stage handed over to the next one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchFailure {
    #[error("no LLM client available")]
    LlmUnavailable,
    #[error("LLM call failed: {0}")]
    LlmError(String),
    #[error("LLM call timed out")]
    Timeout,
    #[error("malformed LLM reply: {0}")]
    Malformed(String),
    #[error("no eligible matches")]
    NoEligibleMatches,
}

impl MatchFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            MatchFailure::LlmUnavailable => "unavailable",
            MatchFailure::LlmError(_) => "error",
            MatchFailure::Timeout => "timeout",
            MatchFailure::Malformed(_) => "malformed",
            MatchFailure::NoEligibleMatches => "no_matches",
        }
    }
}

pub type StageResult = Result<Vec<TrendMatch>, MatchFailure>;

/// One step of the fallback chain. Deferred so later stages only run when
/// the earlier ones failed.
pub struct Stage<'a> {
    pub kind: MatchStage,
    run: Box<dyn FnOnce() -> StageResult + 'a>,
}

impl<'a> Stage<'a> {
    pub fn new(kind: MatchStage, run: impl FnOnce() -> StageResult + 'a) -> Self {
        Self {
            kind,
            run: Box::new(run),
        }
    }

    /// A stage whose result is already known (e.g. an awaited LLM call).
    pub fn ready(kind: MatchStage, result: StageResult) -> Self {
        Self::new(kind, move || result)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub matches: Vec<TrendMatch>,
    /// Stage that produced `matches`; None when every stage failed.
    pub stage: Option<MatchStage>,
    pub failures: Vec<(MatchStage, MatchFailure)>,
}

/// Run stages in order and stop at the first success.
pub fn escalate<'a>(stages: impl IntoIterator<Item = Stage<'a>>) -> MatchOutcome {
    ensure_metrics_described();
    let mut failures = Vec::new();
    for stage in stages {
        counter!(MATCHER_REQUESTS, "stage" => stage.kind.as_str()).increment(1);
        match (stage.run)() {
            Ok(matches) => {
                return MatchOutcome {
                    matches,
                    stage: Some(stage.kind),
                    failures,
                }
            }
            Err(failure) => {
                counter!(
                    MATCHER_STAGE_FAILURES,
                    "stage" => stage.kind.as_str(),
                    "reason" => failure.reason()
                )
                .increment(1);
                debug!(target: "matcher", stage = stage.kind.as_str(), error = %failure, "stage failed, escalating");
                failures.push((stage.kind, failure));
            }
        }
    }
    MatchOutcome {
        failures,
        ..MatchOutcome::default()
    }
}

pub struct TrendKeywordMatcher {
    config: MatcherConfig,
    dictionary: SemanticDictionary,
    llm: Option<DynLlmClient>,
}

impl TrendKeywordMatcher {
    pub fn new(config: MatcherConfig, llm: Option<DynLlmClient>) -> Self {
        let config = config.validated();
        let dictionary = config.build_dictionary();
        Self {
            config,
            dictionary,
            llm,
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &SemanticDictionary {
        &self.dictionary
    }

    /// Ranked matches, at most `max_matches`. Never fails.
    pub async fn match_trends(
        &self,
        trends: &[TrendCandidate],
        keywords: &[String],
        max_matches: usize,
    ) -> Vec<TrendMatch> {
        self.match_detailed(trends, keywords, max_matches).await.matches
    }

    /// Like `match_trends` but also reports which stage answered.
    pub async fn match_detailed(
        &self,
        trends: &[TrendCandidate],
        keywords: &[String],
        max_matches: usize,
    ) -> MatchOutcome {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if trends.is_empty() || keywords.is_empty() || max_matches == 0 {
            return MatchOutcome::default();
        }

        let floor = self.config.min_relevance;
        let llm_result = self.llm_stage(trends, &keywords).await;
        let mut outcome = escalate([
            Stage::ready(MatchStage::Llm, llm_result),
            Stage::new(MatchStage::RuleBased, || {
                rules::rule_based_stage(&self.dictionary, trends, &keywords, floor)
            }),
            Stage::new(MatchStage::Substring, || rules::substring_stage(trends, &keywords)),
        ]);

        if let Some(stage) = outcome.stage {
            let tag = format!("mechanism: {}", stage.as_str());
            for m in &mut outcome.matches {
                m.matching_reasons.push(tag.clone());
            }
        }
        outcome
            .matches
            .sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        outcome.matches.truncate(max_matches);

        info!(
            target: "matcher",
            trends = trends.len(),
            keywords = keywords.len(),
            matches = outcome.matches.len(),
            stage = outcome.stage.map(|s| s.as_str()).unwrap_or("none"),
            "trend matching finished"
        );
        outcome
    }

    /// Rule score of a single trend name, without the eligibility floor.
    pub fn relevance_of(&self, trend_name: &str, keywords: &[String]) -> f64 {
        rules::score_trend(&self.dictionary, trend_name, keywords).score
    }

    async fn llm_stage(&self, trends: &[TrendCandidate], keywords: &[String]) -> StageResult {
        let client = match &self.llm {
            Some(c) if c.is_enabled() => c,
            _ => return Err(MatchFailure::LlmUnavailable),
        };
        let prompt = llm::build_prompt(trends, keywords);
        let reply = match tokio::time::timeout(self.config.llm_timeout(), client.complete(&prompt)).await {
            Err(_) => return Err(MatchFailure::Timeout),
            Ok(Err(e)) => {
                warn!(target: "matcher", provider = client.provider_name(), error = %e, "LLM matching call failed");
                return Err(MatchFailure::LlmError(e.to_string()));
            }
            Ok(Ok(text)) => text,
        };

        let items = llm::parse_response(&reply)?;
        let mut best: Vec<TrendMatch> = Vec::new();
        for item in items {
            if !item.relevance_score.is_finite() {
                continue;
            }
            let score = clamp01(item.relevance_score);
            if score <= self.config.min_relevance {
                continue;
            }
            let trend = match llm::resolve_trend(&item.trend_name, trends) {
                Some(t) => t.clone(),
                None => llm::placeholder_trend(&item.trend_name, self.config.placeholder_volume),
            };
            let mut m = TrendMatch::new(&trend, score);
            m.matching_reasons = item.matching_reasons;
            m.semantic_keywords = item.semantic_keywords;

            match best.iter_mut().find(|b| b.trend_name == m.trend_name) {
                Some(existing) if existing.relevance_score < m.relevance_score => *existing = m,
                Some(_) => {}
                None => best.push(m),
            }
        }

        if best.is_empty() {
            Err(MatchFailure::NoEligibleMatches)
        } else {
            Ok(best)
        }
    }
}
