//! LLM-assisted pain-point and opportunity extraction.
//!
//! Two sequential completions per trend: pain points from sample texts, then
//! opportunities from the texts plus those pain points. Any failure, timeout
//! or disabled client yields empty lists; callers merge the output with the
//! rule-based pain points.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{TrendError, TrendResult};
use crate::llm::DynLlmClient;
use crate::logging::anon_hash;

pub const MAX_PROMPT_POSTS: usize = 20;
pub const MAX_CONTEXT_KEYWORDS: usize = 10;
pub const MAX_ITEMS: usize = 10;
const MIN_ITEM_CHARS: usize = 6;

/// Who the insights are for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightContext {
    pub product_name: Option<String>,
    pub niche_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insights {
    pub pain_points: Vec<String>,
    pub opportunities: Vec<String>,
}

pub struct InsightExtractor {
    llm: DynLlmClient,
    timeout: Duration,
}

impl InsightExtractor {
    pub fn new(llm: DynLlmClient, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn extract(&self, topic: &str, texts: &[String], ctx: &InsightContext) -> Insights {
        if texts.is_empty() || !self.llm.is_enabled() {
            return Insights::default();
        }
        let texts = &texts[..texts.len().min(MAX_PROMPT_POSTS)];

        let Some(pain_reply) = self.ask(topic, &pain_point_prompt(topic, texts, ctx)).await else {
            return Insights::default();
        };
        let mut pain_points = items_or_empty(topic, &pain_reply);
        pain_points.truncate(MAX_ITEMS);

        let mut opportunities = match self
            .ask(topic, &opportunity_prompt(topic, texts, ctx, &pain_points))
            .await
        {
            Some(reply) => items_or_empty(topic, &reply),
            None => Vec::new(),
        };
        opportunities.truncate(MAX_ITEMS);

        debug!(
            target: "llm",
            trend = %topic,
            pain_points = pain_points.len(),
            opportunities = opportunities.len(),
            "insights extracted"
        );
        Insights {
            pain_points,
            opportunities,
        }
    }

    async fn ask(&self, topic: &str, prompt: &str) -> Option<String> {
        match tokio::time::timeout(self.timeout, self.llm.complete(prompt)).await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                warn!(target: "llm", trend = %topic, prompt = %anon_hash(prompt), error = %e, "insight call failed");
                None
            }
            Err(_) => {
                warn!(target: "llm", trend = %topic, timeout_ms = self.timeout.as_millis() as u64, "insight call timed out");
                None
            }
        }
    }
}

fn items_or_empty(topic: &str, reply: &str) -> Vec<String> {
    parse_list_reply(reply).unwrap_or_else(|e| {
        warn!(target: "llm", trend = %topic, kind = e.kind(), error = %e, "insight reply dropped");
        Vec::new()
    })
}

fn context_line(ctx: &InsightContext) -> String {
    let product = ctx.product_name.as_deref().unwrap_or("product");
    let kws: Vec<&str> = ctx
        .niche_keywords
        .iter()
        .take(MAX_CONTEXT_KEYWORDS)
        .map(String::as_str)
        .collect();
    format!("Context: this is for a {product} in the {} space.", kws.join(", "))
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|t| format!("- {}", t.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn pain_point_prompt(topic: &str, texts: &[String], ctx: &InsightContext) -> String {
    format!(
        "Analyze the following posts about \"{topic}\" and identify the main pain points, problems, or frustrations that users are expressing.\n\n\
         {context}\n\n\
         Posts:\n{posts}\n\n\
         Extract 5-10 specific pain points or problems that users are discussing. Format your response as a simple list:\n\
         1. [Pain point 1]\n2. [Pain point 2]\n...\n\n\
         Focus on actionable problems that could be solved by products or services.",
        context = context_line(ctx),
        posts = bullet_list(texts),
    )
}

pub fn opportunity_prompt(
    topic: &str,
    texts: &[String],
    ctx: &InsightContext,
    pain_points: &[String],
) -> String {
    format!(
        "Based on the following posts about \"{topic}\" and the identified pain points, suggest business opportunities or solutions.\n\n\
         {context}\n\n\
         Posts:\n{posts}\n\n\
         Pain points identified:\n{pains}\n\n\
         Identify 5-10 specific business opportunities or solutions that could address these pain points. Format your response as a simple list:\n\
         1. [Opportunity 1]\n2. [Opportunity 2]\n...\n\n\
         Focus on actionable opportunities that fit the product context.",
        context = context_line(ctx),
        posts = bullet_list(&texts[..texts.len().min(10)]),
        pains = bullet_list(pain_points),
    )
}

/// One item per non-empty line, with list numbering (`1.`, `2)`) and bullets
/// (`-`, `*`, `•`) removed. Items of five characters or fewer are dropped, as
/// are JSON and code-fence lines.
pub fn parse_list_response(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.starts_with(['{', '[', '`']))
        .filter(|line| line.chars().count() >= MIN_ITEM_CHARS)
        .map(str::to_string)
        .collect()
}

/// `parse_list_response`, but a non-blank reply without a single list item
/// is `MalformedResponse`.
pub fn parse_list_reply(reply: &str) -> TrendResult<Vec<String>> {
    let items = parse_list_response(reply);
    if items.is_empty() && !reply.trim().is_empty() {
        return Err(TrendError::MalformedResponse("no list items in reply".into()));
    }
    Ok(items)
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(r) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return r.trim();
        }
        return line;
    }
    for marker in ['-', '*', '•'] {
        if let Some(r) = line.strip_prefix(marker) {
            return r.trim();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(i) {
                Some(r) => Ok(r.to_string()),
                None => anyhow::bail!("script exhausted"),
            }
        }
        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn texts() -> Vec<String> {
        vec!["setting up CI is so slow".into(), "why is deploy always broken".into()]
    }

    #[test]
    fn list_parsing_strips_markers() {
        let reply = "1. Slow CI pipelines\n2) Flaky deploys\n\n- Confusing pricing pages\n• ok\n10. Poor documentation for SDKs\n* Too many dashboards";
        assert_eq!(
            parse_list_response(reply),
            vec![
                "Slow CI pipelines",
                "Flaky deploys",
                "Confusing pricing pages",
                "Poor documentation for SDKs",
                "Too many dashboards"
            ]
        );
    }

    #[test]
    fn structured_noise_is_ignored() {
        assert!(parse_list_response("```json\n{\"matches\": []}\n```").is_empty());
    }

    #[test]
    fn numbers_without_marker_are_kept() {
        assert_eq!(parse_list_response("2024 was a big year"), vec!["2024 was a big year"]);
    }

    #[test]
    fn unlisted_reply_is_malformed() {
        let err = parse_list_reply("```json\n{\"items\": []}\n```").unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
        assert!(parse_list_reply("   ").unwrap().is_empty());
        assert_eq!(parse_list_reply("- Slow CI pipelines").unwrap(), vec!["Slow CI pipelines"]);
    }

    #[tokio::test]
    async fn malformed_pain_reply_still_asks_for_opportunities() {
        let llm = Arc::new(Scripted {
            replies: vec!["{\"pain\": true}", "1. Hosted build cache"],
            calls: AtomicUsize::new(0),
        });
        let ex = InsightExtractor::new(llm.clone(), Duration::from_secs(1));
        let out = ex.extract("#DevEx", &texts(), &InsightContext::default()).await;
        assert!(out.pain_points.is_empty());
        assert_eq!(out.opportunities, vec!["Hosted build cache"]);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prompts_carry_topic_and_context() {
        let ctx = InsightContext {
            product_name: Some("DeployBot".into()),
            niche_keywords: vec!["devops".into(), "ci".into()],
        };
        let p = pain_point_prompt("#DevEx", &texts(), &ctx);
        assert!(p.contains("\"#DevEx\""));
        assert!(p.contains("DeployBot in the devops, ci space"));
        assert!(p.contains("- setting up CI is so slow"));

        let o = opportunity_prompt("#DevEx", &texts(), &ctx, &["Slow CI".into()]);
        assert!(o.contains("Pain points identified:\n- Slow CI"));
    }

    #[tokio::test]
    async fn extracts_both_lists() {
        let llm = Arc::new(Scripted {
            replies: vec!["1. Slow CI pipelines\n2. Flaky deploys", "1. Hosted build cache\n2. Deploy previews"],
            calls: AtomicUsize::new(0),
        });
        let ex = InsightExtractor::new(llm.clone(), Duration::from_secs(1));
        let out = ex.extract("#DevEx", &texts(), &InsightContext::default()).await;
        assert_eq!(out.pain_points, vec!["Slow CI pipelines", "Flaky deploys"]);
        assert_eq!(out.opportunities, vec!["Hosted build cache", "Deploy previews"]);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_yields_empty() {
        let llm = Arc::new(Scripted {
            replies: vec![],
            calls: AtomicUsize::new(0),
        });
        let ex = InsightExtractor::new(llm, Duration::from_secs(1));
        assert_eq!(
            ex.extract("t", &texts(), &InsightContext::default()).await,
            Insights::default()
        );
        assert_eq!(
            ex.extract("t", &[], &InsightContext::default()).await,
            Insights::default()
        );
    }
}
