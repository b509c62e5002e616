//! LLM text-completion collaborator: provider abstraction + file cache +
//! daily limit.
//!
//! The core only ever sees `LlmClient::complete(prompt) -> String`. Callers
//! wrap every call in a timeout and treat any error (disabled, limit reached,
//! HTTP failure, empty reply) as "no LLM answer" and degrade.

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ai::LlmConfig;
use crate::logging::anon_hash;
use crate::metrics::{ensure_metrics_described, LLM_CACHE_HITS, LLM_CALLS};

pub const ENV_LLM_TEST_MODE: &str = "LLM_TEST_MODE";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Cached replies older than this are swept when a client is built.
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one prompt, return the raw text reply.
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    /// A disabled client is never called.
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynLlmClient = Arc<dyn LlmClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `LLM_TEST_MODE=mock`, returns a mock client replying `{"matches": []}`.
/// * Else if `config.enabled == false`, returns a disabled client.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_client_from_config(config: &LlmConfig) -> DynLlmClient {
    if std::env::var(ENV_LLM_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockProvider::new(r#"{"matches": []}"#);
        return Arc::new(CachingClient::new(
            mock,
            config.cache_dir.clone(),
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => {
            let provider = OpenAiProvider::new(
                &config.api_key,
                &config.model,
                config.endpoint.as_deref(),
                Duration::from_millis(config.timeout_ms),
            );
            Arc::new(CachingClient::new(
                provider,
                config.cache_dir.clone(),
                config.daily_limit,
            ))
        }
        "mock" => Arc::new(CachingClient::new(
            MockProvider::new(r#"{"matches": []}"#),
            config.cache_dir.clone(),
            config.daily_limit,
        )),
        other => {
            warn!(target: "llm", provider = other, "unknown LLM provider, disabling");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider doing the actual remote call, separated so the same
/// caching wrapper serves production and tests.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn fetch(&self, prompt: &str) -> anyhow::Result<String>;
    fn name(&self) -> &'static str;
}

/// OpenAI-compatible chat completions provider.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str, endpoint: Option<&str>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("microtrend-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(target: "llm", error = %e, "custom HTTP client failed, using defaults");
                reqwest::Client::new()
            });
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.unwrap_or(OPENAI_CHAT_URL).to_string(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn fetch(&self, prompt: &str) -> anyhow::Result<String> {
        if self.api_key.is_empty() {
            anyhow::bail!("missing API key");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let sys = "You analyze social media trends. Follow the requested output format exactly.";
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 1500,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("LLM endpoint returned {status}");
        }
        let body: Resp = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            anyhow::bail!("empty completion");
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always unavailable; used when the LLM is disabled.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("LLM disabled")
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Fixed-reply provider for tests and local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn fetch(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedReply {
    response: String,
}

/// Counter state is guarded by an async `Mutex`; a call reserves its slot
/// before the provider is awaited and hands it back on failure. Cache files
/// are written atomically via rename.
pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!(target: "llm", error = %e, dir = %cache_dir.display(), "cache dir unavailable");
        }
        let swept = sweep_stale_cache(&cache_dir, CACHE_MAX_AGE);
        if swept > 0 {
            debug!(target: "llm", swept, "stale cache entries removed");
        }
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    /// Real calls made (or in flight) today.
    pub async fn calls_today(&self) -> u32 {
        let g = self.counter.lock().await;
        if g.is_expired() {
            0
        } else {
            g.count
        }
    }

    async fn reserve_slot(&self) -> anyhow::Result<()> {
        let mut g = self.counter.lock().await;
        if g.is_expired() {
            g.reset_to_today();
        }
        if g.count >= self.daily_limit_max {
            counter!(LLM_CALLS, "status" => "limited").increment(1);
            anyhow::bail!("daily LLM limit of {} reached", self.daily_limit_max);
        }
        g.count += 1;
        if let Err(e) = save_daily_counter(&self.cache_dir, &g).await {
            debug!(target: "llm", error = %e, "counter write failed");
        }
        Ok(())
    }

    async fn release_slot(&self) {
        let mut g = self.counter.lock().await;
        if g.is_expired() {
            return;
        }
        g.count = g.count.saturating_sub(1);
        if let Err(e) = save_daily_counter(&self.cache_dir, &g).await {
            debug!(target: "llm", error = %e, "counter write failed");
        }
    }

    async fn complete_impl(&self, prompt: &str) -> anyhow::Result<String> {
        ensure_metrics_described();
        let key = cache_key(prompt);

        // 1) Cache hits are free and do not count against the limit.
        if let Some(hit) = read_cache_file(&self.cache_dir, &key).await {
            counter!(LLM_CACHE_HITS).increment(1);
            debug!(target: "llm", prompt_id = %anon_hash(prompt), "cache hit");
            return Ok(hit.response);
        }

        // 2) Daily limit.
        self.reserve_slot().await?;

        // 3) Real call.
        let fresh = match self.inner.fetch(prompt).await {
            Ok(text) => text,
            Err(e) => {
                counter!(LLM_CALLS, "status" => "error").increment(1);
                self.release_slot().await;
                return Err(e);
            }
        };
        counter!(LLM_CALLS, "status" => "ok").increment(1);

        if let Err(e) = write_cache_file(
            &self.cache_dir,
            &key,
            &CachedReply {
                response: fresh.clone(),
            },
        )
        .await
        {
            debug!(target: "llm", error = %e, "cache write failed");
        }
        Ok(fresh)
    }
}

#[async_trait]
impl<P: Provider> LlmClient for CachingClient<P> {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.complete_impl(prompt).await
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn cache_key(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

async fn read_cache_file(dir: &Path, key: &str) -> Option<CachedReply> {
    let buf = tokio::fs::read_to_string(cache_path(dir, key)).await.ok()?;
    serde_json::from_str(&buf).ok()
}

async fn write_cache_file(dir: &Path, key: &str, value: &CachedReply) -> io::Result<()> {
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    write_atomic(&cache_path(dir, key), json.as_bytes()).await
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(tmp, path).await
}

/// Delete cached replies not modified within `max_age`. Returns how many
/// files were removed.
fn sweep_stale_cache(dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let now = SystemTime::now();
    entries
        .filter_map(Result::ok)
        .filter(|e| {
            let p = e.path();
            p.extension().is_some_and(|x| x == "json") && p != counter_path(dir)
        })
        .filter(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| now.duration_since(t).ok())
                .is_some_and(|age| age > max_age)
        })
        .filter(|e| fs::remove_file(e.path()).is_ok())
        .count()
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let s = serde_json::to_string(dc).map_err(io::Error::other)?;
    write_atomic(&counter_path(dir), s.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        async fn fetch(&self, prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo:{}", prompt.len()))
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_provider() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CachingClient::new(
            CountingProvider {
                calls: calls.clone(),
            },
            dir.path().to_path_buf(),
            10,
        );

        let a = client.complete("hello").await.unwrap();
        let b = client.complete("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.calls_today().await, 1);
    }

    #[tokio::test]
    async fn daily_limit_blocks_fresh_calls() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CachingClient::new(
            CountingProvider {
                calls: calls.clone(),
            },
            dir.path().to_path_buf(),
            1,
        );
        assert!(client.complete("one").await.is_ok());
        let err = client.complete("two").await.unwrap_err();
        assert!(err.to_string().contains("daily LLM limit"));
        // cached prompt still served
        assert!(client.complete("one").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct SlowProvider {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Provider for SlowProvider {
        async fn fetch(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                anyhow::bail!("upstream 500");
            }
            Ok("ok".into())
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn concurrent_calls_respect_daily_limit() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(CachingClient::new(
            SlowProvider {
                calls: calls.clone(),
                fail: false,
            },
            dir.path().to_path_buf(),
            1,
        ));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let c = Arc::clone(&client);
                tokio::spawn(async move { c.complete(&format!("prompt {i}")).await })
            })
            .collect();
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.calls_today().await, 1);
    }

    #[tokio::test]
    async fn failed_call_gives_its_slot_back() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CachingClient::new(
            SlowProvider {
                calls: calls.clone(),
                fail: true,
            },
            dir.path().to_path_buf(),
            1,
        );
        assert!(client.complete("a").await.is_err());
        assert!(client.complete("b").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.calls_today().await, 0);
    }

    #[test]
    fn sweep_removes_only_stale_replies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abc.json"), "{}").unwrap();
        fs::write(counter_path(dir.path()), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(sweep_stale_cache(dir.path(), CACHE_MAX_AGE), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sweep_stale_cache(dir.path(), Duration::from_millis(1)), 1);
        assert!(!dir.path().join("abc.json").exists());
        assert!(counter_path(dir.path()).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn counter_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mk = || {
            CachingClient::new(MockProvider::new("ok"), dir.path().to_path_buf(), 5)
        };
        mk().complete("a").await.unwrap();
        mk().complete("b").await.unwrap();
        assert_eq!(mk().calls_today().await, 2);
    }

    #[tokio::test]
    async fn disabled_client_reports_disabled() {
        let c = DisabledClient;
        assert!(!c.is_enabled());
        assert!(c.complete("x").await.is_err());
    }

    #[test]
    fn factory_respects_enabled_flag() {
        let cfg = LlmConfig::default();
        let c = build_client_from_config(&cfg);
        if std::env::var(ENV_LLM_TEST_MODE).is_err() {
            assert_eq!(c.provider_name(), "disabled");
        }
    }

    #[test]
    fn cache_key_is_hex_sha() {
        let k = cache_key("prompt");
        assert_eq!(k.len(), 32);
        assert!(k.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
