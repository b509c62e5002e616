//! Lexicon/valence estimator.
//!
//! Word valences on a -4..4 scale, adjusted for boosters, negation within
//! three tokens, ALL-CAPS emphasis, contrastive "but" and exclamation marks.
//! Output is a positive/negative/neutral split over all tokens.

use std::collections::HashMap;

use super::Components;

const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCR: f64 = 0.293;
const BOOSTER_DECR: f64 = -0.293;
const CAPS_INCR: f64 = 0.733;
const EXCLAMATION_INCR: f64 = 0.292;

static RAW_LEXICON: &str = include_str!("../../lexicon/valence.json");

#[derive(Debug, Clone)]
pub struct ValenceEstimator {
    lexicon: HashMap<String, f64>,
}

impl Default for ValenceEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValenceEstimator {
    /// Build from the embedded lexicon.
    pub fn new() -> Self {
        let lexicon = serde_json::from_str::<HashMap<String, f64>>(RAW_LEXICON).unwrap_or_else(|e| {
            tracing::error!(error = %e, "embedded valence lexicon failed to parse");
            HashMap::new()
        });
        Self { lexicon }
    }

    pub fn valence(&self, word: &str) -> f64 {
        self.lexicon.get(word).copied().unwrap_or(0.0)
    }

    /// Per-token adjusted valences, in token order.
    fn token_valences(&self, tokens: &[&str]) -> Vec<f64> {
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let any_upper = tokens.iter().any(|t| is_all_caps(t));
        let any_lower = tokens.iter().any(|t| !is_all_caps(t));
        let caps_differential = any_upper && any_lower;

        let mut out = Vec::with_capacity(tokens.len());
        for (i, word) in lowered.iter().enumerate() {
            let mut v = self.valence(word);
            if v == 0.0 {
                out.push(0.0);
                continue;
            }
            let sign = v.signum();
            if caps_differential && is_all_caps(tokens[i]) {
                v += sign * CAPS_INCR;
            }
            for k in 1..=3usize {
                if i < k {
                    break;
                }
                let prev = lowered[i - k].as_str();
                let decay = match k {
                    1 => 1.0,
                    2 => 0.95,
                    _ => 0.9,
                };
                if let Some(b) = booster(prev) {
                    v += sign * b * decay;
                }
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(&lowered[i - k]));
            if negated {
                v *= NEGATION_SCALAR;
            }
            out.push(v);
        }

        if let Some(but_idx) = lowered.iter().position(|w| w == "but") {
            for (i, v) in out.iter_mut().enumerate() {
                if i < but_idx {
                    *v *= 0.5;
                } else if i > but_idx {
                    *v *= 1.5;
                }
            }
        }
        out
    }

    /// Raw positive/negative/neutral proportions. Text without any tokens
    /// yields all zeros.
    pub fn estimate(&self, text: &str) -> Components {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Components::zero();
        }

        let valences = self.token_valences(&tokens);
        let sum: f64 = valences.iter().sum();

        let mut pos_sum = 0.0;
        let mut neg_sum = 0.0;
        let mut neu_count = 0.0;
        for v in &valences {
            if *v > 0.0 {
                pos_sum += v + 1.0;
            } else if *v < 0.0 {
                neg_sum += v - 1.0;
            } else {
                neu_count += 1.0;
            }
        }

        let bangs = text.matches('!').count().min(4) as f64;
        let emphasis = bangs * EXCLAMATION_INCR;
        if sum > 0.0 {
            pos_sum += emphasis;
        } else if sum < 0.0 {
            neg_sum -= emphasis;
        }

        let total = pos_sum + neg_sum.abs() + neu_count;
        if total <= 0.0 {
            return Components::zero();
        }
        Components {
            positive: pos_sum / total,
            negative: neg_sum.abs() / total,
            neutral: neu_count / total,
        }
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_all_caps(token: &str) -> bool {
    token.chars().any(|c| c.is_alphabetic())
        && token
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

fn booster(word: &str) -> Option<f64> {
    match word {
        "absolutely" | "amazingly" | "completely" | "extremely" | "highly" | "incredibly"
        | "really" | "so" | "super" | "totally" | "truly" | "very" | "most" | "more" => {
            Some(BOOSTER_INCR)
        }
        "barely" | "hardly" | "slightly" | "somewhat" | "kinda" | "sorta" | "little"
        | "less" | "marginally" => Some(BOOSTER_DECR),
        _ => None,
    }
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "doesn't"
            | "didn't"
            | "nothing"
            | "nobody"
            | "without"
    ) || tok.ends_with("n't")
}
