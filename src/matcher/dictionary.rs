//! Semantic dictionary: keyword -> related terms.
//!
//! Lookups go both ways: `related(k)` gives the terms listed under `k`, and
//! `keys_relating_to(t)` gives every key whose list contains `t`. All entries
//! are lower-cased and kept in key order so iteration is deterministic.

use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticDictionary {
    entries: BTreeMap<String, Vec<String>>,
}

impl Default for SemanticDictionary {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SemanticDictionary {
    /// Build from a user map (e.g. the `[matcher.dictionary]` TOML table).
    /// Blank keys and terms are dropped.
    pub fn from_map(map: &HashMap<String, Vec<String>>) -> Self {
        let mut entries = BTreeMap::new();
        for (k, terms) in map {
            let key = normalize(k);
            if key.is_empty() {
                continue;
            }
            let mut seen = HashSet::new();
            let list: Vec<String> = terms
                .iter()
                .map(|t| normalize(t))
                .filter(|t| !t.is_empty() && *t != key)
                .filter(|t| seen.insert(t.clone()))
                .collect();
            entries.insert(key, list);
        }
        Self { entries }
    }

    /// Built-in seed covering common niche vocabularies.
    pub fn default_seed() -> Self {
        let seed: &[(&str, &[&str])] = &[
            (
                "ai",
                &["artificial intelligence", "machine learning", "deep learning", "chatgpt", "gpt", "llm", "neural", "automation"],
            ),
            ("intelligent", &["ai", "smart", "artificial intelligence", "automation"]),
            (
                "automation",
                &["automated", "automatic", "bot", "workflow", "robotics", "no-code", "ai"],
            ),
            ("tech", &["technology", "software", "innovation", "startup", "digital"]),
            ("innovation", &["innovative", "tech", "startup", "disruption", "breakthrough"]),
            ("startup", &["founder", "entrepreneur", "venture", "saas", "funding", "tech"]),
            ("productivity", &["efficiency", "optimization", "workflow", "focus", "time management"]),
            ("efficiency", &["productivity", "optimization", "lean"]),
            ("marketing", &["seo", "growth", "branding", "advertising", "content", "social media"]),
            ("crypto", &["bitcoin", "ethereum", "blockchain", "web3", "defi", "nft"]),
            ("finance", &["investing", "stocks", "fintech", "trading", "economy", "money"]),
            ("health", &["fitness", "wellness", "nutrition", "workout", "mental health"]),
            ("ecommerce", &["shopify", "online store", "retail", "dropshipping"]),
            ("gaming", &["games", "esports", "playstation", "xbox", "nintendo", "steam"]),
            ("climate", &["sustainability", "renewable", "solar", "carbon", "green energy"]),
            ("design", &["ux", "figma", "branding", "creative", "typography"]),
            ("education", &["learning", "edtech", "course", "students", "teaching"]),
            ("remote work", &["wfh", "work from home", "hybrid", "digital nomad"]),
        ];

        let entries = seed
            .iter()
            .map(|(k, terms)| {
                (
                    (*k).to_string(),
                    terms.iter().map(|t| (*t).to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Terms listed under `keyword` (expects a lower-cased keyword).
    pub fn related(&self, keyword: &str) -> &[String] {
        self.entries.get(keyword).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys whose related terms include `term`.
    pub fn keys_relating_to<'a>(&'a self, term: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(_, terms)| terms.iter().any(|t| t == term))
            .map(|(k, _)| k.as_str())
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
