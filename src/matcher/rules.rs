//! Lexical stages of the matcher: dictionary rules and plain substring hits.

use std::collections::HashSet;

use super::dictionary::SemanticDictionary;
use super::{MatchFailure, StageResult};
use crate::models::{clamp01, TrendCandidate, TrendMatch};

pub const DIRECT_HIT: f64 = 0.9;
pub const SYNONYM_HIT: f64 = 0.7;
pub const REVERSE_HIT: f64 = 0.8;
pub const SUBSTRING_SCORE: f64 = 0.5;

/// Score plus the evidence behind it for one trend name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleScore {
    pub score: f64,
    pub reasons: Vec<String>,
    pub semantic_keywords: Vec<String>,
}

/// Sum the rule contributions of every keyword against `trend_name`,
/// clamped to [0,1]. No floor is applied here.
pub fn score_trend(dict: &SemanticDictionary, trend_name: &str, keywords: &[String]) -> RuleScore {
    let name = trend_name.to_lowercase();
    let mut out = RuleScore::default();
    let mut raw = 0.0;

    for kw in keywords {
        let kw = kw.trim().to_lowercase();
        if kw.is_empty() {
            continue;
        }
        if name.contains(&kw) {
            raw += DIRECT_HIT;
            out.reasons.push(format!("direct keyword match: {kw}"));
            push_unique(&mut out.semantic_keywords, &kw);
            continue;
        }
        if let Some(syn) = dict.related(&kw).iter().find(|s| name.contains(s.as_str())) {
            raw += SYNONYM_HIT;
            out.reasons.push(format!("semantic match: {kw} -> {syn}"));
            push_unique(&mut out.semantic_keywords, syn);
        }
        for key in dict.keys_relating_to(&kw) {
            if name.contains(key) {
                raw += REVERSE_HIT;
                out.reasons.push(format!("related term: {key} <- {kw}"));
                push_unique(&mut out.semantic_keywords, key);
            }
        }
    }

    out.score = clamp01(raw);
    out
}

/// Dictionary-based stage. Keeps trends scoring strictly above `floor`.
pub fn rule_based_stage(
    dict: &SemanticDictionary,
    trends: &[TrendCandidate],
    keywords: &[String],
    floor: f64,
) -> StageResult {
    let matches: Vec<TrendMatch> = dedupe_trends(trends)
        .into_iter()
        .filter_map(|trend| {
            let rs = score_trend(dict, &trend.name, keywords);
            (rs.score > floor).then(|| {
                let mut m = TrendMatch::new(trend, rs.score);
                m.matching_reasons = rs.reasons;
                m.semantic_keywords = rs.semantic_keywords;
                m
            })
        })
        .collect();

    if matches.is_empty() {
        Err(MatchFailure::NoEligibleMatches)
    } else {
        Ok(matches)
    }
}

/// Last resort: the first keyword found inside a trend name gives a fixed
/// score, regardless of any floor. May return an empty list.
pub fn substring_stage(trends: &[TrendCandidate], keywords: &[String]) -> StageResult {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    let matches = dedupe_trends(trends)
        .into_iter()
        .filter_map(|trend| {
            let name = trend.name.to_lowercase();
            let kw = keywords.iter().find(|k| name.contains(k.as_str()))?;
            let mut m = TrendMatch::new(trend, SUBSTRING_SCORE);
            m.matching_reasons.push(format!("simple match: {kw}"));
            m.semantic_keywords.push(kw.clone());
            Some(m)
        })
        .collect();
    Ok(matches)
}

/// First occurrence of each name wins.
fn dedupe_trends(trends: &[TrendCandidate]) -> Vec<&TrendCandidate> {
    let mut seen = HashSet::new();
    trends
        .iter()
        .filter(|t| !t.name.trim().is_empty() && seen.insert(t.name.as_str()))
        .collect()
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|x| x == item) {
        list.push(item.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn direct_and_synonym_hits_add_up() {
        let d = SemanticDictionary::default_seed();
        let rs = score_trend(&d, "#AI", &kws(&["AI", "automation"]));
        // 0.9 direct + 0.7 (automation -> ai), clamped
        assert_eq!(rs.score, 1.0);
        assert!(rs.reasons.iter().any(|r| r.starts_with("direct keyword match")));
        assert!(rs.reasons.iter().any(|r| r.starts_with("semantic match")));
    }

    #[test]
    fn reverse_lookup_scores() {
        let d = SemanticDictionary::default_seed();
        // "chatgpt" is listed under "ai" and the name contains "ai"
        let rs = score_trend(&d, "FutureOfAI", &kws(&["chatgpt"]));
        assert!((rs.score - REVERSE_HIT).abs() < 1e-12, "got {}", rs.score);
        assert_eq!(rs.semantic_keywords, vec!["ai".to_string()]);
    }

    #[test]
    fn unrelated_trend_scores_zero() {
        let d = SemanticDictionary::default_seed();
        assert_eq!(score_trend(&d, "#Cooking", &kws(&["AI", "automation"])).score, 0.0);
    }

    #[test]
    fn rule_stage_applies_floor() {
        let d = SemanticDictionary::default_seed();
        let trends = vec![
            TrendCandidate::new("#AI", Some(50_000)),
            TrendCandidate::new("#Cooking", Some(20_000)),
        ];
        let out = rule_based_stage(&d, &trends, &kws(&["AI", "automation"]), 0.3).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trend_name, "#AI");
        assert!(out[0].relevance_score >= 0.9);

        let none = rule_based_stage(&d, &trends, &kws(&["gardening"]), 0.3);
        assert_eq!(none, Err(MatchFailure::NoEligibleMatches));
    }

    #[test]
    fn substring_stage_ignores_floor_and_takes_first_keyword() {
        let trends = vec![
            TrendCandidate::new("Garden Party", None),
            TrendCandidate::new("Garden Party", None),
            TrendCandidate::new("Tax Day", None),
        ];
        let out = substring_stage(&trends, &kws(&["party", "garden"])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].relevance_score, SUBSTRING_SCORE);
        assert_eq!(out[0].matching_reasons, vec!["simple match: party".to_string()]);
    }

    #[test]
    fn substring_stage_can_be_empty() {
        let trends = vec![TrendCandidate::new("Tax Day", None)];
        assert!(substring_stage(&trends, &kws(&["", "crypto"])).unwrap().is_empty());
    }
}
