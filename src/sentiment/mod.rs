//! Sentiment fusion.
//!
//! Two independent estimators (polarity/subjectivity and lexicon/valence) are
//! each reduced to positive/negative/neutral components, blended with fixed
//! weights and renormalized into a `SentimentBreakdown`. Emotion detection is
//! a separate keyword pass.

pub mod emotion;
pub mod polarity;
pub mod valence;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{EmotionLabel, SentimentBreakdown, SentimentSummary};

pub use emotion::EmotionLexicon;
pub use polarity::{PolarityEstimator, PolarityScore};
pub use valence::ValenceEstimator;

/// Un-normalized positive/negative/neutral triple produced by one estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Components {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

impl Components {
    pub fn zero() -> Self {
        Self::default()
    }

    fn scaled(self, w: f64) -> Self {
        Self {
            positive: self.positive * w,
            negative: self.negative * w,
            neutral: self.neutral * w,
        }
    }

    fn plus(self, o: Self) -> Self {
        Self {
            positive: self.positive + o.positive,
            negative: self.negative + o.negative,
            neutral: self.neutral + o.neutral,
        }
    }
}

/// Blend weights of the two estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub polarity: f64,
    pub valence: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            polarity: 0.4,
            valence: 0.6,
        }
    }
}

impl FusionWeights {
    /// Negative or non-finite weights become 0; if both end up 0 the
    /// defaults are restored.
    pub fn validated(self) -> Self {
        let ok = |x: f64| if x.is_finite() && x > 0.0 { x } else { 0.0 };
        let (p, v) = (ok(self.polarity), ok(self.valence));
        if p + v <= 0.0 {
            return Self::default();
        }
        Self {
            polarity: p,
            valence: v,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SentimentFuser {
    polarity: PolarityEstimator,
    valence: ValenceEstimator,
    emotions: EmotionLexicon,
    weights: FusionWeights,
}

impl SentimentFuser {
    pub fn new(weights: FusionWeights) -> Self {
        Self {
            polarity: PolarityEstimator::new(),
            valence: ValenceEstimator::new(),
            emotions: EmotionLexicon,
            weights: weights.validated(),
        }
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Fused breakdown of one text. Blank text is fully neutral.
    pub fn analyze(&self, text: &str) -> SentimentBreakdown {
        if text.trim().is_empty() {
            return SentimentBreakdown::neutral();
        }
        let blended = self
            .polarity
            .estimate(text)
            .scaled(self.weights.polarity)
            .plus(self.valence.estimate(text).scaled(self.weights.valence));

        SentimentBreakdown::from_components(
            blended.positive,
            blended.negative,
            blended.neutral,
            self.emotions.detect(text),
        )
    }

    /// Mean of per-item components; the aggregate emotion is the most
    /// frequent per-item emotion (ties go to lexicon order).
    pub fn analyze_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
    ) -> (SentimentBreakdown, Vec<SentimentBreakdown>) {
        let per_item: Vec<SentimentBreakdown> =
            texts.iter().map(|t| self.analyze(t.as_ref())).collect();
        (aggregate(&per_item), per_item)
    }

    pub fn detect_emotion(&self, text: &str) -> Option<EmotionLabel> {
        self.emotions.detect(text)
    }
}

/// Mean breakdown over `items`; neutral when empty.
pub fn aggregate(items: &[SentimentBreakdown]) -> SentimentBreakdown {
    if items.is_empty() {
        return SentimentBreakdown::neutral();
    }
    let n = items.len() as f64;
    let (p, ng, u) = items.iter().fold((0.0, 0.0, 0.0), |acc, b| {
        (acc.0 + b.positive, acc.1 + b.negative, acc.2 + b.neutral)
    });

    SentimentBreakdown::from_components(p / n, ng / n, u / n, most_frequent_emotion(items))
}

fn most_frequent_emotion(items: &[SentimentBreakdown]) -> Option<EmotionLabel> {
    let mut counts: HashMap<EmotionLabel, usize> = HashMap::new();
    for e in items.iter().filter_map(|b| b.dominant_emotion) {
        *counts.entry(e).or_insert(0) += 1;
    }
    let mut best: Option<(EmotionLabel, usize)> = None;
    for label in EmotionLabel::ALL {
        let n = counts.get(&label).copied().unwrap_or(0);
        match best {
            Some((_, m)) if m >= n => {}
            _ if n > 0 => best = Some((label, n)),
            _ => {}
        }
    }
    best.map(|(l, _)| l)
}

/// Averages and distributions over a set of breakdowns.
pub fn summarize(items: &[SentimentBreakdown]) -> SentimentSummary {
    if items.is_empty() {
        return SentimentSummary::default();
    }
    let n = items.len() as f64;
    let mut summary = SentimentSummary {
        total_analyzed: items.len(),
        ..SentimentSummary::default()
    };
    for b in items {
        summary.avg_positive += b.positive / n;
        summary.avg_negative += b.negative / n;
        summary.avg_neutral += b.neutral / n;
        summary.avg_confidence += b.confidence / n;
        *summary
            .sentiment_distribution
            .entry(b.dominant_sentiment)
            .or_insert(0) += 1;
        if let Some(e) = b.dominant_emotion {
            *summary.emotion_distribution.entry(e).or_insert(0) += 1;
        }
    }
    summary
}
