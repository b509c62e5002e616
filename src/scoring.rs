//! Potential score and micro-trend classification.
//!
//! Potential = w_v*lognorm(velocity) + w_a*adopter_ratio
//!           + w_e*min(1, engagement_rate/cap) + w_r*relevance
//!
//! Each term is clamped to [0,1] before weighting and the sum is clamped to
//! [0,1]. The micro-trend gate is a separate hard check on volume, velocity,
//! adopter ratio and potential.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::models::{clamp01, AnalyzedTrend};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PotentialWeights {
    pub velocity: f64,
    pub early_adopter: f64,
    pub engagement: f64,
    pub relevance: f64,
    /// Engagement rate at which the engagement term saturates.
    pub engagement_cap: f64,
    /// Velocity (posts/hour) + 1 at which the velocity term saturates.
    pub velocity_log_base: f64,
}

impl Default for PotentialWeights {
    fn default() -> Self {
        Self {
            velocity: 0.3,
            early_adopter: 0.25,
            engagement: 0.25,
            relevance: 0.2,
            engagement_cap: 0.1,
            velocity_log_base: 10.0,
        }
    }
}

impl PotentialWeights {
    pub fn validated(self) -> Self {
        let d = Self::default();
        let w = |x: f64, fallback: f64| if x.is_finite() && x >= 0.0 { x } else { fallback };
        let out = Self {
            velocity: w(self.velocity, d.velocity),
            early_adopter: w(self.early_adopter, d.early_adopter),
            engagement: w(self.engagement, d.engagement),
            relevance: w(self.relevance, d.relevance),
            engagement_cap: if self.engagement_cap.is_finite() && self.engagement_cap > 0.0 {
                self.engagement_cap
            } else {
                d.engagement_cap
            },
            velocity_log_base: if self.velocity_log_base.is_finite() && self.velocity_log_base > 1.0
            {
                self.velocity_log_base
            } else {
                d.velocity_log_base
            },
        };
        if out.velocity + out.early_adopter + out.engagement + out.relevance <= 0.0 {
            return Self {
                engagement_cap: out.engagement_cap,
                velocity_log_base: out.velocity_log_base,
                ..d
            };
        }
        out
    }
}

/// Raw signals feeding the potential score. Non-finite or negative values
/// are treated as 0 and ratios are clamped to [0,1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PotentialInputs {
    pub velocity: f64,
    pub adopter_ratio: f64,
    pub avg_engagement_rate: f64,
    pub relevance: f64,
}

impl PotentialInputs {
    pub fn new(velocity: f64, adopter_ratio: f64, avg_engagement_rate: f64, relevance: f64) -> Self {
        let non_neg = |x: f64| if x.is_finite() && x > 0.0 { x } else { 0.0 };
        Self {
            velocity: non_neg(velocity),
            adopter_ratio: clamp01(adopter_ratio),
            avg_engagement_rate: non_neg(avg_engagement_rate),
            relevance: clamp01(relevance),
        }
    }
}

/// Weighted term contributions, kept for logging and debugging.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PotentialParts {
    pub velocity: f64,
    pub early_adopter: f64,
    pub engagement: f64,
    pub relevance: f64,
}

impl PotentialParts {
    pub fn total(&self) -> f64 {
        clamp01(self.velocity + self.early_adopter + self.engagement + self.relevance)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PotentialScorer {
    weights: PotentialWeights,
}

impl PotentialScorer {
    pub fn new(weights: PotentialWeights) -> Self {
        Self {
            weights: weights.validated(),
        }
    }

    pub fn weights(&self) -> &PotentialWeights {
        &self.weights
    }

    /// `min(1, ln(v+1) / ln(base))`.
    pub fn velocity_term(&self, velocity: f64) -> f64 {
        if !(velocity.is_finite() && velocity > 0.0) {
            return 0.0;
        }
        clamp01((velocity + 1.0).ln() / self.weights.velocity_log_base.ln())
    }

    pub fn engagement_term(&self, rate: f64) -> f64 {
        clamp01(rate / self.weights.engagement_cap)
    }

    pub fn parts(&self, inputs: &PotentialInputs) -> PotentialParts {
        let w = &self.weights;
        PotentialParts {
            velocity: w.velocity * self.velocity_term(inputs.velocity),
            early_adopter: w.early_adopter * clamp01(inputs.adopter_ratio),
            engagement: w.engagement * self.engagement_term(inputs.avg_engagement_rate),
            relevance: w.relevance * clamp01(inputs.relevance),
        }
    }

    /// Potential score in [0,1].
    pub fn score(&self, inputs: &PotentialInputs) -> f64 {
        self.parts(inputs).total()
    }
}

/// Signals checked by the micro-trend gate. `None` fails the gate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GateInputs {
    pub tweet_volume: Option<u64>,
    pub velocity: Option<f64>,
    pub adopter_ratio: Option<f64>,
    pub potential: Option<f64>,
}

/// Hard gate: every threshold must be met, whatever the blended score.
pub fn passes_gate(inputs: &GateInputs, config: &AnalysisConfig) -> bool {
    let at_least = |v: Option<f64>, min: f64| v.is_some_and(|x| x.is_finite() && x >= min);

    inputs
        .tweet_volume
        .is_some_and(|v| v >= config.min_tweet_volume)
        && at_least(inputs.velocity, config.velocity_threshold)
        && at_least(inputs.adopter_ratio, config.early_adopter_threshold)
        && at_least(inputs.potential, config.min_potential_score)
}

pub fn is_micro_trend(trend: &AnalyzedTrend, config: &AnalysisConfig) -> bool {
    passes_gate(
        &GateInputs {
            tweet_volume: trend.tweet_volume,
            velocity: Some(trend.velocity_score),
            adopter_ratio: Some(trend.early_adopter_ratio),
            potential: Some(trend.trend_potential_score),
        },
        config,
    )
}

/// Trends passing the gate, flagged and sorted by potential descending.
pub fn detect_micro_trends(trends: &[AnalyzedTrend], config: &AnalysisConfig) -> Vec<AnalyzedTrend> {
    let mut out: Vec<AnalyzedTrend> = trends
        .iter()
        .filter(|t| is_micro_trend(t, config))
        .map(|t| AnalyzedTrend {
            is_micro_trend: true,
            ..t.clone()
        })
        .collect();
    out.sort_by(|a, b| b.trend_potential_score.total_cmp(&a.trend_potential_score));
    out
}
