//! Prompt construction and lenient parsing for the LLM matching stage.
//!
//! The model is asked for `{"matches": [...]}` inside a ```json fence. Replies
//! are never trusted to follow that: the payload is located by fence, then by
//! outermost braces, then by outermost brackets, and every field is optional.

use serde_json::Value;

use super::MatchFailure;
use crate::models::{TrendCandidate, TrendOrigin};

pub const MAX_PROMPT_MATCHES: usize = 10;
pub const DEFAULT_ITEM_SCORE: f64 = 0.5;
const PLACEHOLDER_SEARCH_URL: &str = "https://twitter.com/search?q=";

/// One entry of the model's reply, before it is tied back to a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMatchItem {
    pub trend_name: String,
    pub relevance_score: f64,
    pub matching_reasons: Vec<String>,
    pub semantic_keywords: Vec<String>,
}

pub fn build_prompt(trends: &[TrendCandidate], keywords: &[String]) -> String {
    let listed: Vec<String> = trends
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {} (volume: {})", i + 1, t.name, t.tweet_volume.unwrap_or(0)))
        .collect();
    let limit = MAX_PROMPT_MATCHES.min(trends.len());

    format!(
        r#"You are a social media trend analyst. Find the trending topics below that are most relevant to the user's keywords.

User keywords: {keywords}

Current trending topics:
{listed}

Return at most {limit} matches as JSON in exactly this shape:

```json
{{
  "matches": [
    {{
      "trend_name": "topic name",
      "relevance_score": 0.85,
      "matching_reasons": ["reason 1", "reason 2"],
      "semantic_keywords": ["related term 1", "related term 2"]
    }}
  ]
}}
```

Relevance scale:
- 1.0: exact match, the topic is directly about a keyword
- 0.8-0.9: strongly related, clear semantic link
- 0.6-0.7: related, some semantic link
- 0.4-0.5: weakly related, indirect link
- 0.0-0.3: not related

Rank by, in order of importance:
1. direct keyword match
2. semantic relation (synonyms, related concepts)
3. industry relation
4. contextual relation
5. volume and practical usefulness

Return only the JSON, no other text."#,
        keywords = keywords.join(", "),
        listed = listed.join("\n"),
    )
}

/// Extract match items from a free-form reply.
pub fn parse_response(text: &str) -> Result<Vec<LlmMatchItem>, MatchFailure> {
    let value = locate_payload(text)
        .ok_or_else(|| MatchFailure::Malformed("no JSON payload in reply".into()))?;

    let items = match &value {
        Value::Object(map) => match map.get("matches") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(MatchFailure::Malformed("`matches` is not an array".into())),
            None => return Err(MatchFailure::Malformed("missing `matches`".into())),
        },
        Value::Array(items) => items,
        _ => return Err(MatchFailure::Malformed("payload is not an object".into())),
    };

    Ok(items.iter().filter_map(parse_item).collect())
}

/// Tie a model-supplied name back to a candidate: exact name first, then a
/// case-insensitive substring in either direction.
pub fn resolve_trend<'a>(name: &str, trends: &'a [TrendCandidate]) -> Option<&'a TrendCandidate> {
    if let Some(t) = trends.iter().find(|t| t.name == name) {
        return Some(t);
    }
    let needle = name.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    trends.iter().find(|t| {
        let hay = t.name.to_lowercase();
        !hay.is_empty() && (hay.contains(&needle) || needle.contains(&hay))
    })
}

/// Stand-in candidate for a name the model produced that matches nothing.
pub fn placeholder_trend(name: &str, volume: u64) -> TrendCandidate {
    let q = name.trim().replace('#', "%23").replace(' ', "+");
    let mut t = TrendCandidate::new(name.trim(), Some(volume)).with_origin(TrendOrigin::Placeholder);
    t.url = Some(format!("{PLACEHOLDER_SEARCH_URL}{q}"));
    t
}

fn locate_payload(text: &str) -> Option<Value> {
    let mut attempts: Vec<&str> = Vec::with_capacity(4);
    if let Some(block) = fenced_block(text) {
        attempts.push(block);
    }
    attempts.push(text.trim());
    if let (Some(s), Some(e)) = (text.find('{'), text.rfind('}')) {
        if s < e {
            attempts.push(&text[s..=e]);
        }
    }
    if let (Some(s), Some(e)) = (text.find('['), text.rfind(']')) {
        if s < e {
            attempts.push(&text[s..=e]);
        }
    }
    attempts
        .into_iter()
        .find_map(|a| serde_json::from_str::<Value>(a).ok())
        .filter(|v| v.is_object() || v.is_array())
}

/// Body of the first ```json fence (or a bare ``` fence). An unterminated
/// fence runs to the end of the text.
fn fenced_block(text: &str) -> Option<&str> {
    let (start, open_len) = match text.find("```json") {
        Some(i) => (i, "```json".len()),
        None => (text.find("```")?, 3),
    };
    let body = &text[start + open_len..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

fn parse_item(v: &Value) -> Option<LlmMatchItem> {
    let obj = v.as_object()?;
    let trend_name = obj
        .get("trend_name")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)?
        .trim()
        .to_string();
    if trend_name.is_empty() {
        return None;
    }
    let relevance_score = match obj.get("relevance_score") {
        None | Some(Value::Null) => DEFAULT_ITEM_SCORE,
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        Some(_) => return None,
    };
    Some(LlmMatchItem {
        trend_name,
        relevance_score,
        matching_reasons: string_list(obj.get("matching_reasons")),
        semantic_keywords: string_list(obj.get("semantic_keywords")),
    })
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
