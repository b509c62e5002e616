//! Polarity/subjectivity estimator over an adjective lexicon.
//!
//! Each known word carries `(polarity in [-1,1], subjectivity in [0,1])`.
//! A preceding intensifier scales both, a preceding negator multiplies the
//! polarity by -0.5. The text score is the mean over matched words.

use std::collections::HashMap;

use super::Components;

static RAW_LEXICON: &str = include_str!("../../lexicon/polarity.json");

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolarityScore {
    pub polarity: f64,
    pub subjectivity: f64,
}

impl PolarityScore {
    /// pos = max(p, 0), neg = max(-p, 0), neu = 1 - |p|.
    pub fn components(&self) -> Components {
        let p = self.polarity.clamp(-1.0, 1.0);
        Components {
            positive: p.max(0.0),
            negative: (-p).max(0.0),
            neutral: 1.0 - p.abs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolarityEstimator {
    lexicon: HashMap<String, (f64, f64)>,
}

impl Default for PolarityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl PolarityEstimator {
    pub fn new() -> Self {
        let lexicon = serde_json::from_str::<HashMap<String, (f64, f64)>>(RAW_LEXICON)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "embedded polarity lexicon failed to parse");
                HashMap::new()
            });
        Self { lexicon }
    }

    pub fn score(&self, text: &str) -> PolarityScore {
        let words: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let mut polarities = Vec::new();
        let mut subjectivities = Vec::new();
        for (i, w) in words.iter().enumerate() {
            let Some(&(mut p, mut s)) = self.lexicon.get(w.as_str()) else {
                continue;
            };
            if i >= 1 {
                if let Some(m) = intensity(&words[i - 1]) {
                    p = (p * m).clamp(-1.0, 1.0);
                    s = (s * m).clamp(0.0, 1.0);
                }
            }
            let negated = (1..=2).any(|k| i >= k && is_negation(&words[i - k]));
            if negated {
                p *= -0.5;
            }
            polarities.push(p);
            subjectivities.push(s);
        }

        if polarities.is_empty() {
            return PolarityScore::default();
        }
        let n = polarities.len() as f64;
        PolarityScore {
            polarity: (polarities.iter().sum::<f64>() / n).clamp(-1.0, 1.0),
            subjectivity: (subjectivities.iter().sum::<f64>() / n).clamp(0.0, 1.0),
        }
    }

    pub fn estimate(&self, text: &str) -> Components {
        if text.trim().is_empty() {
            return Components::zero();
        }
        self.score(text).components()
    }
}

fn intensity(word: &str) -> Option<f64> {
    match word {
        "very" | "so" | "super" => Some(1.3),
        "really" | "too" => Some(1.2),
        "extremely" | "incredibly" | "absolutely" => Some(1.5),
        "quite" | "pretty" => Some(1.1),
        "slightly" | "somewhat" | "kinda" => Some(0.7),
        _ => None,
    }
}

fn is_negation(word: &str) -> bool {
    matches!(word, "not" | "never" | "no" | "hardly") || word.ends_with("n't")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_and_negative_words() {
        let e = PolarityEstimator::new();
        assert!(e.score("what a great product").polarity > 0.5);
        assert!(e.score("terrible support").polarity < -0.5);
        assert_eq!(e.score("the table is brown").polarity, 0.0);
    }

    #[test]
    fn negation_halves_and_flips() {
        let e = PolarityEstimator::new();
        let p = e.score("not good").polarity;
        assert!((p - (-0.35)).abs() < 1e-9, "got {p}");
    }

    #[test]
    fn components_map_polarity() {
        let c = PolarityScore {
            polarity: -0.4,
            subjectivity: 0.5,
        }
        .components();
        assert_eq!(c.positive, 0.0);
        assert!((c.negative - 0.4).abs() < 1e-12);
        assert!((c.neutral - 0.6).abs() < 1e-12);
    }
}
