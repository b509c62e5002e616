//! Text preprocessing: cleaning, keyword/hashtag extraction, pain points and
//! questions.
//!
//! All compiled state (regexes, stop-words, lemmatizer tables, optional phrase
//! extractor) lives in `TextAnalysisContext`, which the caller builds once and
//! passes by reference. Nothing here is global, and nothing here fails on bad
//! input: empty or malformed text yields empty lists.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{AggregatedText, Post, ProcessedPost};

/// Tunables for preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Keep hashtags as bare words (`#ai` -> `ai`); when false they are dropped.
    pub preserve_hashtags: bool,
    pub preserve_mentions: bool,
    pub min_keyword_len: usize,
    pub max_keywords_per_post: usize,
    pub max_keywords_aggregate: usize,
    pub max_pain_points: usize,
    /// Aggregate pain points must occur at least this often across the batch.
    pub min_pain_point_occurrences: usize,
    pub max_questions: usize,
    pub max_hashtags: usize,
    /// Additional pain-point regexes appended to the built-in library.
    pub extra_pain_patterns: Vec<String>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            preserve_hashtags: true,
            preserve_mentions: false,
            min_keyword_len: 3,
            max_keywords_per_post: 20,
            max_keywords_aggregate: 50,
            max_pain_points: 20,
            min_pain_point_occurrences: 2,
            max_questions: 20,
            max_hashtags: 30,
            extra_pain_patterns: Vec::new(),
        }
    }
}

/// Complaint / limitation phrasing.
const PAIN_PATTERNS: &[&str] = &[
    r"can't\s+\w+",
    r"cannot\s+\w+",
    r"unable\s+to\s+\w+",
    r"struggling\s+with\s+\w+",
    r"frustrated\s+(?:by|with)\s+\w+",
    r"hate\s+when\s+\w+",
    r"wish\s+\w+\s+would",
    r"why\s+is\s+\w+\s+so",
    r"problem\s+with\s+\w+",
    r"issue\s+with\s+\w+",
    r"annoying\s+\w+",
    r"terrible\s+\w+",
    r"worst\s+\w+",
    r"broken\s+\w+",
    r"doesn't\s+work",
    r"not\s+working",
    r"fails\s+to\s+\w+",
];

const INTERROGATIVES: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];

const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "can", "will", "just",
    "don", "should", "now", "would", "could", "also", "get", "got", "really", "still",
    "even", "much", "many", "like", "one", "rt", "via", "amp", "gt", "lt",
];

/// Irregular plural forms the suffix rules would get wrong.
const LEMMA_EXCEPTIONS: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("geese", "goose"),
    ("data", "data"),
    ("media", "media"),
    ("news", "news"),
    ("series", "series"),
    ("analyses", "analysis"),
    ("crises", "crisis"),
];

/// Source of multi-word keywords (noun phrases, entities) to enrich the
/// single-token keywords. Optional; the context works without one.
pub trait PhraseExtractor: Send + Sync {
    /// `cleaned` is already lower-cased and stripped of URLs and mentions.
    fn extract(&self, cleaned: &str) -> Vec<String>;
}

/// Pairs of adjacent content words (`machine learning`, `battery life`).
/// A cheap stand-in for noun-phrase chunking; pairs never span a stop-word.
#[derive(Debug, Default, Clone)]
pub struct AdjacentTermExtractor;

impl PhraseExtractor for AdjacentTermExtractor {
    fn extract(&self, cleaned: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut prev: Option<&str> = None;
        for tok in cleaned.split(|c: char| !c.is_alphabetic()) {
            if tok.is_empty() {
                continue;
            }
            let content = tok.chars().count() >= 3 && !STOPWORDS.contains(&tok);
            if let (Some(p), true) = (prev, content) {
                out.push(format!("{p} {tok}"));
            }
            prev = if content { Some(tok) } else { None };
        }
        out
    }
}

/// Compiled preprocessing state, built once by the caller and shared by
/// reference.
pub struct TextAnalysisContext {
    url_re: Regex,
    mention_re: Regex,
    hashtag_re: Regex,
    word_re: Regex,
    ws_re: Regex,
    pain_patterns: Vec<Regex>,
    stopwords: HashSet<&'static str>,
    lemma_exceptions: HashMap<&'static str, &'static str>,
    phrase_extractor: Option<Box<dyn PhraseExtractor>>,
}

impl std::fmt::Debug for TextAnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextAnalysisContext")
            .field("pain_patterns", &self.pain_patterns.len())
            .field("stopwords", &self.stopwords.len())
            .field("phrase_extractor", &self.phrase_extractor.is_some())
            .finish()
    }
}

impl TextAnalysisContext {
    /// Compile the built-in pattern library plus any `extra_pain_patterns`.
    pub fn new(options: &PreprocessOptions) -> anyhow::Result<Self> {
        let mut pain_patterns = Vec::with_capacity(PAIN_PATTERNS.len());
        for p in PAIN_PATTERNS
            .iter()
            .copied()
            .chain(options.extra_pain_patterns.iter().map(String::as_str))
        {
            let re = Regex::new(p)
                .map_err(|e| anyhow::anyhow!("invalid pain pattern '{}': {}", p, e))?;
            pain_patterns.push(re);
        }

        Ok(Self {
            url_re: Regex::new(r"(?:https?://|www\.)\S+")?,
            mention_re: Regex::new(r"@[\w_]+")?,
            hashtag_re: Regex::new(r"#([\w_]+)")?,
            word_re: Regex::new(r"[^\W\d_]+")?,
            ws_re: Regex::new(r"\s+")?,
            pain_patterns,
            stopwords: STOPWORDS.iter().copied().collect(),
            lemma_exceptions: LEMMA_EXCEPTIONS.iter().copied().collect(),
            phrase_extractor: None,
        })
    }

    pub fn with_phrase_extractor(mut self, extractor: Box<dyn PhraseExtractor>) -> Self {
        self.phrase_extractor = Some(extractor);
        self
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Rule-based noun lemmatizer: exception table, then plural suffixes.
    pub fn lemmatize(&self, token: &str) -> String {
        if let Some(l) = self.lemma_exceptions.get(token) {
            return (*l).to_string();
        }
        let n = token.len();
        if n > 4 && token.ends_with("ies") {
            return format!("{}y", &token[..n - 3]);
        }
        if n > 4 && ["sses", "xes", "ches", "shes", "zes"].iter().any(|s| token.ends_with(s)) {
            return token[..n - 2].to_string();
        }
        if n > 3
            && token.ends_with('s')
            && !["ss", "us", "is", "os"].iter().any(|s| token.ends_with(s))
        {
            return token[..n - 1].to_string();
        }
        token.to_string()
    }
}

/// Stateless driver over a `TextAnalysisContext`.
#[derive(Debug, Clone, Default)]
pub struct TextPreprocessor {
    options: PreprocessOptions,
}

impl TextPreprocessor {
    pub fn new(options: PreprocessOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    /// Lower-case, drop URLs, handle hashtags/mentions per options, collapse whitespace.
    pub fn clean(&self, ctx: &TextAnalysisContext, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        let decoded = html_escape::decode_html_entities(text);
        let lower = decoded.to_lowercase().replace('\u{2019}', "'");
        let no_urls = ctx.url_re.replace_all(&lower, " ");
        let tags = if self.options.preserve_hashtags {
            ctx.hashtag_re.replace_all(&no_urls, "$1")
        } else {
            ctx.hashtag_re.replace_all(&no_urls, " ")
        };
        let mentions = if self.options.preserve_mentions {
            tags
        } else {
            std::borrow::Cow::Owned(ctx.mention_re.replace_all(&tags, " ").into_owned())
        };
        ctx.ws_re.replace_all(&mentions, " ").trim().to_string()
    }

    /// Top keywords of one text, most frequent first (first-seen order on ties).
    pub fn extract_keywords(&self, ctx: &TextAnalysisContext, text: &str) -> Vec<String> {
        let cleaned = self.clean(ctx, text);
        self.keywords_from_cleaned(ctx, &cleaned)
    }

    fn keywords_from_cleaned(&self, ctx: &TextAnalysisContext, cleaned: &str) -> Vec<String> {
        if cleaned.is_empty() {
            return Vec::new();
        }
        let mut terms: Vec<String> = ctx
            .word_re
            .find_iter(cleaned)
            .map(|m| m.as_str())
            .filter(|t| t.chars().count() >= self.options.min_keyword_len)
            .filter(|t| !ctx.is_stopword(t))
            .map(|t| ctx.lemmatize(t))
            .collect();

        if let Some(extractor) = &ctx.phrase_extractor {
            terms.extend(
                extractor
                    .extract(cleaned)
                    .into_iter()
                    .filter(|p| p.split_whitespace().count() <= 3),
            );
        }

        top_by_frequency(terms, self.options.max_keywords_per_post)
    }

    /// Hashtags without the leading `#`, lower-cased, in order of appearance.
    pub fn extract_hashtags(&self, ctx: &TextAnalysisContext, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        ctx.hashtag_re
            .captures_iter(&lower)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Distinct pain-point phrases in one text, in order of first match.
    pub fn extract_pain_points(&self, ctx: &TextAnalysisContext, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let lower = text.to_lowercase().replace('\u{2019}', "'");
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for re in &ctx.pain_patterns {
            for m in re.find_iter(&lower) {
                let phrase = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
                if seen.insert(phrase.clone()) {
                    out.push(phrase);
                }
            }
        }
        out
    }

    /// Sentences that end in `?` or open with an interrogative word.
    pub fn extract_questions(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for sentence in split_sentences(text) {
            let first = sentence
                .split_whitespace()
                .next()
                .map(|w| {
                    w.trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase()
                })
                .unwrap_or_default();
            if sentence.ends_with('?') || INTERROGATIVES.contains(&first.as_str()) {
                out.push(sentence.to_string());
            }
        }
        out
    }

    /// Process one post into its derived record.
    pub fn process_post(&self, ctx: &TextAnalysisContext, post: &Post) -> ProcessedPost {
        let cleaned = self.clean(ctx, &post.text);
        ProcessedPost {
            post_id: post.id.clone(),
            keywords: self.keywords_from_cleaned(ctx, &cleaned),
            hashtags: self.extract_hashtags(ctx, &post.text),
            pain_points: self.extract_pain_points(ctx, &post.text),
            questions: self.extract_questions(&post.text),
            cleaned_text: cleaned,
        }
    }

    /// Process a batch. Posts with blank text are skipped.
    pub fn process(&self, ctx: &TextAnalysisContext, posts: &[Post]) -> AggregatedText {
        let mut keywords = Vec::new();
        let mut pain_counts: Vec<String> = Vec::new();
        let mut questions = Vec::new();
        let mut seen_questions = HashSet::new();
        let mut hashtags = Vec::new();
        let mut processed_posts = Vec::with_capacity(posts.len());

        for post in posts.iter().filter(|p| !p.text.trim().is_empty()) {
            let pp = self.process_post(ctx, post);
            keywords.extend(pp.keywords.iter().cloned());
            pain_counts.extend(pp.pain_points.iter().cloned());
            hashtags.extend(pp.hashtags.iter().cloned());
            for q in &pp.questions {
                if seen_questions.insert(q.clone()) {
                    questions.push(q.clone());
                }
            }
            processed_posts.push(pp);
        }

        let min_pain = self.options.min_pain_point_occurrences.max(1);
        let pain_points = ranked_counts(pain_counts)
            .into_iter()
            .filter(|(_, n)| *n >= min_pain)
            .take(self.options.max_pain_points)
            .map(|(p, _)| p)
            .collect();

        questions.truncate(self.options.max_questions);

        AggregatedText {
            all_keywords: top_by_frequency(keywords, self.options.max_keywords_aggregate),
            pain_points,
            questions,
            hashtags: top_by_frequency(hashtags, self.options.max_hashtags),
            processed_texts: processed_posts
                .iter()
                .map(|p| p.cleaned_text.clone())
                .collect(),
            processed_posts,
        }
    }
}

/// Count items, ordered by count descending then first appearance.
fn ranked_counts(items: Vec<String>) -> Vec<(String, usize)> {
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for item in items {
        match index.get(&item) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(item.clone(), order.len());
                order.push((item, 1));
            }
        }
    }
    // stable sort keeps first-seen order among equal counts
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
}

fn top_by_frequency(items: Vec<String>, max: usize) -> Vec<String> {
    ranked_counts(items)
        .into_iter()
        .take(max)
        .map(|(k, _)| k)
        .collect()
}

/// Split on `.`, `!` or `?` followed by whitespace (or end of text).
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = match chars.peek() {
                None => true,
                Some((_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                let end = i + c.len_utf8();
                let s = text[start..end].trim();
                if !s.is_empty() {
                    out.push(s);
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
